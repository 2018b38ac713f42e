//! # Google Cloud Translation client
//!
//! Implements [`TranslationService`] on top of the Cloud Translation v2 REST API.

use super::{TranslationResult, TranslationService};
use crate::config::AppConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
    detected_source_language: Option<String>,
}

pub struct GoogleTranslateHandler {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

impl GoogleTranslateHandler {
    pub fn new(app_config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(app_config.http_timeout())
            .build()
            .context("failed to build translation http client")?;

        Ok(Self {
            client,
            endpoint: app_config.google_translate_endpoint.clone(),
            project_id: app_config.google_cloud_project_id.clone(),
            api_key: app_config.google_translate_api_key.clone(),
        })
    }
}

#[async_trait]
impl TranslationService for GoogleTranslateHandler {
    async fn translate(&self, text: &str, target_language: &str) -> Result<TranslationResult> {
        let request = TranslateRequest {
            q: text,
            target: target_language,
            format: "text",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header("x-goog-user-project", &self.project_id)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to translation API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());

            anyhow::bail!("Translation API returned error status {}: {}", status, body);
        }

        let translate_response: TranslateResponse = response
            .json()
            .await
            .context("Failed to parse translation API response")?;

        first_translation(translate_response)
    }
}

fn first_translation(response: TranslateResponse) -> Result<TranslationResult> {
    let translation = response
        .data
        .translations
        .into_iter()
        .next()
        .context("Translation API returned no translations")?;

    if translation.translated_text.trim().is_empty() {
        anyhow::bail!("Translation API returned an empty translation");
    }

    Ok(TranslationResult {
        text: translation.translated_text,
        source_language: translation.detected_source_language,
    })
}
