//! # WhatsApp API Client
//!
//! Sends replies through the WhatsApp Cloud API. The business phone number a
//! reply goes out from is chosen per call, so one client serves every channel
//! that delivers webhooks to this service.

use super::outgoing_schemas::{OutgoingTextMessage, WhatsAppMessageResponse};
use crate::{config::AppConfig, services::MessagingService};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// WhatsApp API client for sending messages
pub struct WhatsAppClient {
    /// HTTP client for making API requests
    client: reqwest::Client,
    /// Graph API base, e.g. `https://graph.facebook.com/v22.0`
    api_base: String,
    /// Authentication token
    auth_token: String,
}

impl WhatsAppClient {
    /// Creates a new WhatsApp client
    pub fn new(app_config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(app_config.http_timeout())
            .build()
            .context("failed to build WhatsApp http client")?;

        Ok(Self {
            client,
            api_base: format!(
                "{base}/{version}",
                base = app_config.whatsapp_graph_api_base.trim_end_matches('/'),
                version = app_config.whatsapp_graph_api_version
            ),
            auth_token: app_config.whatsapp_business_auth.clone(),
        })
    }

    /// Messages endpoint of the given business phone number
    fn send_msg_endpoint(&self, phone_number_id: &str) -> String {
        format!("{}/{}/messages", self.api_base, phone_number_id)
    }

    /// Internal method to send any message type to WhatsApp API
    async fn send_message<T: serde::Serialize + Sync>(
        &self,
        phone_number_id: &str,
        message: &T,
    ) -> Result<WhatsAppMessageResponse> {
        let response = self
            .client
            .post(self.send_msg_endpoint(phone_number_id))
            .bearer_auth(&self.auth_token)
            .json(message)
            .send()
            .await
            .context("Failed to send request to WhatsApp API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());

            anyhow::bail!("WhatsApp API returned error status {}: {}", status, body);
        }

        let whatsapp_response: WhatsAppMessageResponse = response
            .json()
            .await
            .context("Failed to parse WhatsApp API response")?;

        Ok(whatsapp_response)
    }
}

#[async_trait]
impl MessagingService for WhatsAppClient {
    async fn send_text(&self, channel_id: &str, recipient_id: &str, body: &str) -> Result<()> {
        let message = OutgoingTextMessage::new(recipient_id.to_string(), body.to_string());
        let response = self.send_message(channel_id, &message).await?;

        if let Some(sent) = response.messages.first() {
            logfire::debug!("WhatsApp accepted message {id}", id = sent.id.clone());
        }

        Ok(())
    }
}
