//! # Webhook payload parser
//!
//! Turns the nested WhatsApp envelope into a single [`InboundEvent`].
//!
//! Only the first entry, first change and first message (or status) are
//! considered. Meta delivers one event per webhook call in practice; payloads
//! that batch several events are acknowledged but only their first event is
//! handled.

use super::schemas::{Change, Message, Status, Value, WebhookPayload};
use crate::consts;
use derive_more::{Display, Error};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EventKind {
    Message,
    StatusUpdate,
    Unknown,
}

/// One normalized unit of work extracted from a webhook delivery
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender_id: String,
    /// Business phone number id that received the event, taken from the payload
    pub recipient_channel_id: String,
    pub kind: EventKind,
    /// Always non-empty for [`EventKind::Message`], `None` otherwise
    pub text: Option<String>,
    pub message_id: Option<String>,
    /// Kept for diagnostics only
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ParseError {
    #[display("missing field `{_0}`")]
    MissingField(#[error(not(source))] &'static str),
    #[display("message has no text body")]
    EmptyText,
    #[display("unrecognized payload shape: {_0}")]
    UnrecognizedShape(#[error(not(source))] String),
}

impl ParseError {
    pub fn category(&self) -> &'static str {
        match self {
            ParseError::MissingField(_) => "missing_field",
            ParseError::EmptyText => "empty_text",
            ParseError::UnrecognizedShape(_) => "unrecognized_shape",
        }
    }
}

/// Parses a raw webhook payload into an [`InboundEvent`].
///
/// # Errors
///
/// * [`ParseError::UnrecognizedShape`] - fields with unexpected types or a foreign `object`
/// * [`ParseError::MissingField`] - the envelope lacks entries, changes, value, sender or channel
/// * [`ParseError::EmptyText`] - a message without a non-empty `text.body`
pub fn parse_event(raw_payload: &serde_json::Value) -> Result<InboundEvent, ParseError> {
    let payload = WebhookPayload::deserialize(raw_payload)
        .map_err(|e| ParseError::UnrecognizedShape(e.to_string()))?;

    let object = payload.object.ok_or(ParseError::MissingField("object"))?;
    if object != consts::WHATSAPP_OBJECT {
        return Err(ParseError::UnrecognizedShape(format!(
            "unexpected object `{object}`"
        )));
    }

    let change = payload
        .entry
        .ok_or(ParseError::MissingField("entry"))?
        .into_iter()
        .next()
        .ok_or(ParseError::MissingField("entry[0]"))?
        .changes
        .ok_or(ParseError::MissingField("entry[0].changes"))?
        .into_iter()
        .next()
        .ok_or(ParseError::MissingField("entry[0].changes[0]"))?;

    let Change { field, value } = change;
    let value = value.ok_or(ParseError::MissingField("entry[0].changes[0].value"))?;

    let field = field.as_deref();
    if field.is_some_and(|f| f != consts::MESSAGES_FIELD) {
        return Ok(unknown_event(&value, raw_payload));
    }

    let channel_id = value
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.phone_number_id.clone())
        .filter(|id| !id.is_empty());

    if let Some(message) = value.messages.and_then(|m| m.into_iter().next()) {
        let channel_id =
            channel_id.ok_or(ParseError::MissingField("value.metadata.phone_number_id"))?;
        return message_event(message, channel_id, raw_payload);
    }

    if let Some(status) = value.statuses.and_then(|s| s.into_iter().next()) {
        return Ok(status_event(status, channel_id, raw_payload));
    }

    Ok(InboundEvent {
        sender_id: String::new(),
        recipient_channel_id: channel_id.unwrap_or_default(),
        kind: EventKind::Unknown,
        text: None,
        message_id: None,
        raw_payload: raw_payload.clone(),
    })
}

fn message_event(
    message: Message,
    channel_id: String,
    raw_payload: &serde_json::Value,
) -> Result<InboundEvent, ParseError> {
    let sender_id = message
        .from
        .filter(|from| !from.is_empty())
        .ok_or(ParseError::MissingField("messages[0].from"))?;

    let text = message
        .text
        .and_then(|text| text.body)
        .filter(|body| !body.is_empty())
        .ok_or(ParseError::EmptyText)?;

    Ok(InboundEvent {
        sender_id,
        recipient_channel_id: channel_id,
        kind: EventKind::Message,
        text: Some(text),
        message_id: message.id,
        raw_payload: raw_payload.clone(),
    })
}

fn status_event(
    status: Status,
    channel_id: Option<String>,
    raw_payload: &serde_json::Value,
) -> InboundEvent {
    InboundEvent {
        sender_id: status.recipient_id.unwrap_or_default(),
        recipient_channel_id: channel_id.unwrap_or_default(),
        kind: EventKind::StatusUpdate,
        text: None,
        message_id: status.id,
        raw_payload: raw_payload.clone(),
    }
}

fn unknown_event(value: &Value, raw_payload: &serde_json::Value) -> InboundEvent {
    InboundEvent {
        sender_id: String::new(),
        recipient_channel_id: value
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.phone_number_id.clone())
            .unwrap_or_default(),
        kind: EventKind::Unknown,
        text: None,
        message_id: None,
        raw_payload: raw_payload.clone(),
    }
}

#[cfg(test)]
pub fn text_message_payload(from: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "123456",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "phone123"
                    },
                    "contacts": [{"profile": {"name": "Ana"}, "wa_id": from}],
                    "messages": [{
                        "from": from,
                        "id": "wamid.msg123",
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": {"body": body}
                    }]
                }
            }]
        }]
    })
}

#[cfg(test)]
pub fn status_payload() -> serde_json::Value {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "123456",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "phone123"
                    },
                    "statuses": [{
                        "id": "wamid.out1",
                        "status": "delivered",
                        "timestamp": "1700000001",
                        "recipient_id": "15551234567"
                    }]
                }
            }]
        }]
    })
}
