pub mod translation;

use async_trait::async_trait;

/// Text returned by a translation provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    pub text: String,
    /// Language the provider detected in the input, when reported
    pub source_language: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> anyhow::Result<TranslationResult>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Sends a plain text message from the business channel `channel_id`.
    async fn send_text(
        &self,
        channel_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> anyhow::Result<()>;
}

pub type ImplTranslationService = Box<dyn TranslationService>;
pub type ImplMessagingService = Box<dyn MessagingService>;
