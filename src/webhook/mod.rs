//! Webhook handlers for external integrations
//!
//! ## Modules
//!
//! - [`whatsapp`] - WhatsApp Business API webhook handlers

pub mod routes;
pub mod whatsapp;
