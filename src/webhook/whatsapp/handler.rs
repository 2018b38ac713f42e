//! # WhatsApp Webhook Handler
//!
//! Runs one acknowledged delivery through parse → verify → authorize →
//! translate → reply. Every stage ends either by handing over to the next one
//! or in a terminal [`PipelineOutcome`]; collaborator failures are logged and
//! never propagate.
//!
//! Deliveries are not de-duplicated: a payload Meta retries is translated and
//! answered again.

use super::{
    authorization::{self, AllowReason, AuthorizationDecision},
    parser::{self, EventKind, InboundEvent, ParseError},
    security::{self, SignatureMode, VerificationResult},
    tasks::Delivery,
};
use crate::{
    config::Settings,
    consts, metric,
    services::{ImplMessagingService, ImplTranslationService, TranslationResult},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

/// A message about to be sent back to a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub recipient_channel_id: String,
    pub to: String,
    pub body: String,
}

impl OutboundReply {
    fn new(event: &InboundEvent, body: String) -> Self {
        Self {
            recipient_channel_id: event.recipient_channel_id.clone(),
            to: event.sender_id.clone(),
            body: truncate_chars(body, consts::WHATSAPP_MAX_TEXT_LEN),
        }
    }

    pub fn translation(
        event: &InboundEvent,
        translation: &TranslationResult,
        target: &str,
    ) -> Self {
        let body = match translation.source_language.as_deref() {
            Some(source) => format!("[{source} → {target}]\n{}", translation.text),
            None => translation.text.clone(),
        };
        Self::new(event, body)
    }

    pub fn courtesy(event: &InboundEvent) -> Self {
        Self::new(event, consts::COURTESY_REPLY_TEXT.to_string())
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text,
    }
}

/// Terminal state reached by a delivery.
///
/// Status updates and unknown events end as `Ignored` without any action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Rejected(ParseError),
    SignatureRejected,
    Ignored(EventKind),
    Denied { courtesy_sent: bool },
    TranslationFailed,
    DispatchFailed,
    Replied,
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Rejected(_) => "rejected",
            PipelineOutcome::SignatureRejected => "signature_rejected",
            PipelineOutcome::Ignored(_) => "ignored",
            PipelineOutcome::Denied { .. } => "denied",
            PipelineOutcome::TranslationFailed => "translation_failed",
            PipelineOutcome::DispatchFailed => "dispatch_failed",
            PipelineOutcome::Replied => "replied",
        }
    }
}

/// Keeps the last four digits of a phone number for logs
fn mask_sender(sender_id: &str) -> String {
    let visible: String = sender_id
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{visible}")
}

pub struct WebhookPipeline {
    settings: Arc<Settings>,
    translator: ImplTranslationService,
    messenger: ImplMessagingService,
}

impl WebhookPipeline {
    pub fn new(
        settings: Arc<Settings>,
        translator: ImplTranslationService,
        messenger: ImplMessagingService,
    ) -> Self {
        Self {
            settings,
            translator,
            messenger,
        }
    }

    /// Processes one acknowledged delivery until it reaches a terminal state.
    pub async fn process(&self, delivery: Delivery) -> PipelineOutcome {
        let span = logfire::span!(
            "whatsapp_delivery",
            delivery_id = delivery.delivery_id.to_string()
        );

        let outcome = self.run(&delivery).instrument(span).await;
        metric::incr_pipeline_outcome_statds(outcome.label());

        outcome
    }

    async fn run(&self, delivery: &Delivery) -> PipelineOutcome {
        let queued_ms = (Utc::now() - delivery.received_at).num_milliseconds();
        logfire::debug!(
            "Processing delivery queued for {queued_ms}ms",
            queued_ms = queued_ms
        );

        let event = match parser::parse_event(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                logfire::warn!(
                    "Dropping delivery with unusable payload ({category}): {error}",
                    category = e.category(),
                    error = e.to_string()
                );
                return PipelineOutcome::Rejected(e);
            }
        };

        let verification = security::verify(
            &delivery.raw_body,
            delivery.signature.as_deref(),
            &self.settings.app_secret,
            self.settings.signature_mode,
        );
        metric::incr_signature_statds(verification.label());
        if !self.signature_accepted(&verification) {
            return PipelineOutcome::SignatureRejected;
        }

        match event.kind {
            EventKind::Message => {}
            EventKind::StatusUpdate => {
                logfire::debug!(
                    "Acknowledged status update for {message_id}",
                    message_id = event.message_id.clone().unwrap_or_default()
                );
                return PipelineOutcome::Ignored(event.kind);
            }
            EventKind::Unknown => {
                logfire::debug!(
                    "Acknowledged unknown event: {payload}",
                    payload = event.raw_payload.to_string()
                );
                return PipelineOutcome::Ignored(event.kind);
            }
        }

        let decision = authorization::authorize(
            &event.sender_id,
            &self.settings.allow_list,
            self.settings.authorization_bypass,
        );
        metric::incr_authorization_statds(decision.label());
        match decision {
            AuthorizationDecision::Allowed(AllowReason::AllowListed) => {}
            AuthorizationDecision::Allowed(AllowReason::Bypassed) => {
                logfire::warn!(
                    "Authorization bypassed for sender {sender}",
                    sender = mask_sender(&event.sender_id)
                );
            }
            AuthorizationDecision::Denied => {
                logfire::info!(
                    "Sender {sender} is not authorized",
                    sender = mask_sender(&event.sender_id)
                );
                let courtesy_sent = self.send_courtesy_reply(&event).await;
                return PipelineOutcome::Denied { courtesy_sent };
            }
        }

        let Some(text) = event.text.as_deref() else {
            return PipelineOutcome::Rejected(ParseError::EmptyText);
        };

        let translation = match self
            .translator
            .translate(text, &self.settings.target_language)
            .await
        {
            Ok(translation) if !translation.text.trim().is_empty() => translation,
            Ok(_) => {
                logfire::error!("Translation provider returned an empty text");
                return PipelineOutcome::TranslationFailed;
            }
            Err(e) => {
                logfire::error!(
                    "Failed to translate message: {error}",
                    error = format!("{e:#}")
                );
                return PipelineOutcome::TranslationFailed;
            }
        };

        let target = &self.settings.target_language;
        let reply = OutboundReply::translation(&event, &translation, target);
        match self
            .messenger
            .send_text(&reply.recipient_channel_id, &reply.to, &reply.body)
            .await
        {
            Ok(()) => {
                logfire::info!(
                    "Translation of {message_id} sent to {sender}",
                    message_id = event.message_id.clone().unwrap_or_default(),
                    sender = mask_sender(&event.sender_id)
                );
                PipelineOutcome::Replied
            }
            Err(e) => {
                logfire::error!(
                    "Failed to send translation: {error}",
                    error = format!("{e:#}")
                );
                PipelineOutcome::DispatchFailed
            }
        }
    }

    fn signature_accepted(&self, verification: &VerificationResult) -> bool {
        let mode = self.settings.signature_mode;
        match verification {
            VerificationResult::Verified => true,
            VerificationResult::Unverified(reason) if mode == SignatureMode::Relaxed => {
                logfire::warn!(
                    "Processing unverified delivery in relaxed mode: {reason}",
                    reason = reason.to_string()
                );
                true
            }
            VerificationResult::Skipped(reason) if mode == SignatureMode::Relaxed => {
                logfire::warn!("Signature check skipped: {reason}", reason = *reason);
                true
            }
            VerificationResult::Unverified(reason) => {
                logfire::warn!(
                    "Rejecting unverified delivery: {reason}",
                    reason = reason.to_string()
                );
                false
            }
            VerificationResult::Skipped(reason) => {
                logfire::warn!(
                    "Rejecting delivery, signature check skipped: {reason}",
                    reason = *reason
                );
                false
            }
        }
    }

    /// Best effort notice to an unauthorized sender, returns whether it was delivered.
    async fn send_courtesy_reply(&self, event: &InboundEvent) -> bool {
        let reply = OutboundReply::courtesy(event);

        match self
            .messenger
            .send_text(&reply.recipient_channel_id, &reply.to, &reply.body)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                logfire::warn!(
                    "Failed to send courtesy reply: {error}",
                    error = format!("{e:#}")
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_settings,
        services::{MockMessagingService, MockTranslationService},
        webhook::whatsapp::{
            parser::{status_payload, text_message_payload},
            security::signature_header_value,
        },
    };
    use ntex::util::Bytes;

    fn pipeline(
        settings: Settings,
        translator: MockTranslationService,
        messenger: MockMessagingService,
    ) -> WebhookPipeline {
        WebhookPipeline::new(
            Arc::new(settings),
            Box::new(translator),
            Box::new(messenger),
        )
    }

    fn signed_delivery(payload: serde_json::Value) -> Delivery {
        let raw_body = serde_json::to_vec(&payload).unwrap();
        let signature = signature_header_value(&raw_body, "test_secret");
        Delivery::new(Bytes::from(raw_body), Some(signature), payload)
    }

    fn hello() -> anyhow::Result<TranslationResult> {
        Ok(TranslationResult {
            text: "Hello".to_string(),
            source_language: Some("es".to_string()),
        })
    }

    #[ntex::test]
    async fn test_authorized_message_is_translated_and_replied() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .withf(|text, target| text == "Hola" && target == "en")
            .times(1)
            .returning(|_, _| hello());

        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .withf(|channel, to, body| {
                channel == "phone123" && to == "15551234567" && body.contains("Hello")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("15551234567", "Hola")))
            .await;

        assert_eq!(outcome, PipelineOutcome::Replied);
    }

    #[ntex::test]
    async fn test_sender_without_country_code_matches_allow_list() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .times(1)
            .returning(|_, _| hello());
        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .withf(|_, to, _| to == "5551234567")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("5551234567", "Hola")))
            .await;

        assert_eq!(outcome, PipelineOutcome::Replied);
    }

    #[ntex::test]
    async fn test_status_update_needs_no_collaborator() {
        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            MockTranslationService::new(),
            MockMessagingService::new(),
        );

        let outcome = pipeline.process(signed_delivery(status_payload())).await;

        assert_eq!(outcome, PipelineOutcome::Ignored(EventKind::StatusUpdate));
    }

    #[ntex::test]
    async fn test_unknown_event_needs_no_collaborator() {
        let mut translator = MockTranslationService::new();
        translator.expect_translate().never();
        let mut messenger = MockMessagingService::new();
        messenger.expect_send_text().never();

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "field": "account_update",
                    "value": { "event": "VERIFIED_ACCOUNT" }
                }]
            }]
        });

        let outcome = pipeline.process(signed_delivery(payload)).await;

        assert_eq!(outcome, PipelineOutcome::Ignored(EventKind::Unknown));
    }

    #[ntex::test]
    async fn test_unauthorized_sender_gets_single_courtesy_reply() {
        let mut translator = MockTranslationService::new();
        translator.expect_translate().never();

        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .withf(|channel, to, body| {
                channel == "phone123" && to == "19998887777" && body == consts::COURTESY_REPLY_TEXT
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("19998887777", "Hola")))
            .await;

        let courtesy_sent = true;
        assert_eq!(outcome, PipelineOutcome::Denied { courtesy_sent });
    }

    #[ntex::test]
    async fn test_failed_courtesy_reply_is_contained() {
        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("graph api unavailable")));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            MockTranslationService::new(),
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("19998887777", "Hola")))
            .await;

        let courtesy_sent = false;
        assert_eq!(outcome, PipelineOutcome::Denied { courtesy_sent });
    }

    #[ntex::test]
    async fn test_bypass_allows_unlisted_sender() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .times(1)
            .returning(|_, _| hello());
        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .withf(|_, _, body| body != consts::COURTESY_REPLY_TEXT)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, true),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("19998887777", "Hola")))
            .await;

        assert_eq!(outcome, PipelineOutcome::Replied);
    }

    #[ntex::test]
    async fn test_translation_error_sends_nothing() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("quota exceeded")));
        let mut messenger = MockMessagingService::new();
        messenger.expect_send_text().never();

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("15551234567", "Hola")))
            .await;

        assert_eq!(outcome, PipelineOutcome::TranslationFailed);
    }

    #[ntex::test]
    async fn test_empty_translation_sends_nothing() {
        let mut translator = MockTranslationService::new();
        translator.expect_translate().times(1).returning(|_, _| {
            Ok(TranslationResult {
                text: "   ".to_string(),
                source_language: None,
            })
        });
        let mut messenger = MockMessagingService::new();
        messenger.expect_send_text().never();

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("15551234567", "Hola")))
            .await;

        assert_eq!(outcome, PipelineOutcome::TranslationFailed);
    }

    #[ntex::test]
    async fn test_dispatch_error_is_terminal() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .times(1)
            .returning(|_, _| hello());
        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("WhatsApp API returned error status 500")));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let outcome = pipeline
            .process(signed_delivery(text_message_payload("15551234567", "Hola")))
            .await;

        assert_eq!(outcome, PipelineOutcome::DispatchFailed);
    }

    #[ntex::test]
    async fn test_strict_mode_rejects_bad_signature() {
        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            MockTranslationService::new(),
            MockMessagingService::new(),
        );
        let payload = text_message_payload("15551234567", "Hola");
        let raw_body = Bytes::from(serde_json::to_vec(&payload).unwrap());

        let unsigned = Delivery::new(raw_body.clone(), None, payload.clone());
        let outcome = pipeline.process(unsigned).await;
        assert_eq!(outcome, PipelineOutcome::SignatureRejected);

        let forged = Delivery::new(
            raw_body,
            Some(signature_header_value(b"other body", "test_secret")),
            payload,
        );
        let outcome = pipeline.process(forged).await;
        assert_eq!(outcome, PipelineOutcome::SignatureRejected);
    }

    #[ntex::test]
    async fn test_relaxed_mode_processes_unsigned_delivery() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .times(1)
            .returning(|_, _| hello());
        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline(
            test_settings(SignatureMode::Relaxed, false),
            translator,
            messenger,
        );
        let payload = text_message_payload("15551234567", "Hola");
        let raw_body = Bytes::from(serde_json::to_vec(&payload).unwrap());

        let delivery = Delivery::new(raw_body, None, payload);
        let outcome = pipeline.process(delivery).await;

        assert_eq!(outcome, PipelineOutcome::Replied);
    }

    #[ntex::test]
    async fn test_unusable_payload_is_rejected_quietly() {
        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            MockTranslationService::new(),
            MockMessagingService::new(),
        );

        let outcome = pipeline
            .process(signed_delivery(text_message_payload("15551234567", "")))
            .await;

        assert_eq!(outcome, PipelineOutcome::Rejected(ParseError::EmptyText));
    }

    #[ntex::test]
    async fn test_identical_deliveries_are_processed_independently() {
        let mut translator = MockTranslationService::new();
        translator
            .expect_translate()
            .times(2)
            .returning(|_, _| hello());
        let mut messenger = MockMessagingService::new();
        messenger
            .expect_send_text()
            .times(2)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline(
            test_settings(SignatureMode::Strict, false),
            translator,
            messenger,
        );
        let payload = text_message_payload("15551234567", "Hola");
        let raw_body = Bytes::from(serde_json::to_vec(&payload).unwrap());
        let signature = signature_header_value(&raw_body, "test_secret");

        for _ in 0..2 {
            let signature = Some(signature.clone());
            let delivery = Delivery::new(raw_body.clone(), signature, payload.clone());
            assert_eq!(pipeline.process(delivery).await, PipelineOutcome::Replied);
        }
    }

    #[test]
    fn test_translation_reply_body() {
        let event = parser::parse_event(&text_message_payload("15551234567", "Hola")).unwrap();

        let tagged = OutboundReply::translation(
            &event,
            &TranslationResult {
                text: "Hello".to_string(),
                source_language: Some("es".to_string()),
            },
            "en",
        );
        assert_eq!(tagged.body, "[es → en]\nHello");
        assert_eq!(tagged.to, "15551234567");
        assert_eq!(tagged.recipient_channel_id, "phone123");

        let untagged = OutboundReply::translation(
            &event,
            &TranslationResult {
                text: "Hello".to_string(),
                source_language: None,
            },
            "en",
        );
        assert_eq!(untagged.body, "Hello");
    }

    #[test]
    fn test_reply_body_is_capped_on_char_boundary() {
        let long = "ñ".repeat(consts::WHATSAPP_MAX_TEXT_LEN + 10);
        let capped = truncate_chars(long, consts::WHATSAPP_MAX_TEXT_LEN);

        assert_eq!(capped.chars().count(), consts::WHATSAPP_MAX_TEXT_LEN);
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
    }

    #[test]
    fn test_mask_sender() {
        assert_eq!(mask_sender("15551234567"), "***4567");
        assert_eq!(mask_sender("12"), "***12");
    }
}
