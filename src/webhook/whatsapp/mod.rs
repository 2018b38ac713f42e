//! WhatsApp webhook integration module
//!
//! Receives WhatsApp Business webhooks, translates inbound text messages and
//! replies to the sender with the translation.
//!
//! ## Submodules
//!
//! - [`routes`] - HTTP endpoints: subscription handshake and delivery acknowledgement
//! - [`tasks`] - Delivery queue and the background processor draining it
//! - [`handler`] - Pipeline taking one delivery to a terminal outcome
//! - [`security`] - `X-Hub-Signature-256` verification
//! - [`parser`] - Turns raw payloads into an [`parser::InboundEvent`]
//! - [`authorization`] - Sender allow-list with phone number normalization
//! - [`source_filter`] - Optional network allow-list for deliveries
//! - [`schemas`] / [`outgoing_schemas`] - Incoming and outgoing wire formats
//! - [`client`] - WhatsApp Cloud API client for sending replies

pub mod authorization;
pub mod client;
pub mod handler;
pub mod outgoing_schemas;
pub mod parser;
pub mod routes;
pub mod schemas;
pub mod security;
pub mod source_filter;
pub mod tasks;

pub use routes::{receive, verify};
