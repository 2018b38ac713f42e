//! # WhatsApp Webhook Schemas
//!
//! Data structures for the JSON payload WhatsApp posts when webhook events
//! occur (incoming messages, status updates, etc.).
//!
//! Every field is optional: Meta adds and drops fields between API versions
//! and partial payloads must still deserialize so the parser can report
//! precisely what is missing.

use serde::{Deserialize, Serialize};

/// Root webhook payload from WhatsApp
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WebhookPayload {
    /// The object type, typically "whatsapp_business_account"
    pub object: Option<String>,
    /// Array of entry objects containing the actual data
    pub entry: Option<Vec<Entry>>,
}

/// Entry object containing changes and metadata
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Entry {
    /// Array of changes that occurred
    pub changes: Option<Vec<Change>>,
}

/// Change object containing the actual webhook data
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Change {
    /// The field that changed (e.g., "messages")
    pub field: Option<String>,
    /// The value containing the actual data
    pub value: Option<Value>,
}

/// Value object containing messages and metadata
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Value {
    /// Metadata about the phone number
    pub metadata: Option<Metadata>,
    /// Array of messages received
    pub messages: Option<Vec<Message>>,
    /// Array of statuses (for sent messages)
    pub statuses: Option<Vec<Status>>,
}

/// Metadata about the WhatsApp Business phone number
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Metadata {
    /// Phone number ID
    pub phone_number_id: Option<String>,
}

/// Message object
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Message {
    /// Sender's WhatsApp ID (phone number)
    pub from: Option<String>,
    /// Message ID
    pub id: Option<String>,
    /// Text message content (if type is "text")
    pub text: Option<TextMessage>,
}

/// Text message content
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TextMessage {
    /// The text body of the message
    pub body: Option<String>,
}

/// Status update for sent messages
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Status {
    /// Message ID
    pub id: Option<String>,
    /// Recipient ID
    pub recipient_id: Option<String>,
}
