//! Application configuration management with security considerations.
//!
//! [`AppConfig`] is read once from the environment at startup and turned into
//! an immutable [`Settings`] value. `Settings` is shared behind an `Arc` with
//! the HTTP handlers and the webhook pipeline and is never mutated afterwards.
//!
//! # Security Notes
//! - Sensitive fields are clearly marked and should never be logged
//! - Production must run with strict signature enforcement unless explicitly overridden

use crate::webhook::whatsapp::{
    authorization::{AllowList, CountryCode},
    security::SignatureMode,
    source_filter::SourceFilter,
};
use anyhow::{Context, bail};
use envconfig::Envconfig;
use std::time::Duration;

/// Environment variables used to configure the application.
#[derive(Envconfig, Clone)]
pub struct AppConfig {
    /// Environment name to deploy the app (NON-SENSITIVE)
    /// Values: "local", "dev", "staging", "production"
    #[envconfig(default = "local")]
    pub env: String,

    /// Host address for web server binding (NON-SENSITIVE)
    #[envconfig(default = "0.0.0.0")]
    pub web_server_host: String,

    /// Port for web server binding (NON-SENSITIVE)
    #[envconfig(default = "8080")]
    pub web_server_port: u16,

    /// 🔒 SENSITIVE: Meta app secret used to sign webhook payloads
    /// Security: Required in production, rotate from the Meta app dashboard
    pub whatsapp_app_secret: Option<String>,

    /// 🔒 SENSITIVE: Token echoed back during webhook subscription
    pub whatsapp_verify_token: String,

    /// 🔒 SENSITIVE: WhatsApp Business authentication token
    /// Security: Store in secure secret management system
    pub whatsapp_business_auth: String,

    /// Graph API base URL (NON-SENSITIVE)
    #[envconfig(default = "https://graph.facebook.com")]
    pub whatsapp_graph_api_base: String,

    /// Graph API version (NON-SENSITIVE)
    #[envconfig(default = "v22.0")]
    pub whatsapp_graph_api_version: String,

    /// Google Cloud project billed for translations (NON-SENSITIVE)
    pub google_cloud_project_id: String,

    /// 🔒 SENSITIVE: Google Cloud Translation API key
    pub google_translate_api_key: String,

    /// Google Cloud Translation endpoint (NON-SENSITIVE)
    #[envconfig(default = "https://translation.googleapis.com/language/translate/v2")]
    pub google_translate_endpoint: String,

    /// Language every inbound message is translated into (NON-SENSITIVE)
    #[envconfig(default = "en")]
    pub translation_target_language: String,

    /// Comma separated phone numbers allowed to use the service (SEMI-SENSITIVE)
    /// Example: "15551234567,+52 55 1234 5678"
    pub authorized_senders: Option<String>,

    /// Country code prefixed to national numbers during normalization (NON-SENSITIVE)
    #[envconfig(default = "1")]
    pub default_country_code: String,

    /// Signature enforcement override: "strict" or "relaxed" (NON-SENSITIVE)
    pub signature_mode: Option<String>,

    /// Authorization override, allows every sender when true (NON-SENSITIVE)
    pub authorization_bypass: Option<bool>,

    /// Comma separated CIDR ranges allowed to POST webhooks (NON-SENSITIVE)
    pub webhook_source_cidrs: Option<String>,

    /// Comma separated CIDR ranges of proxies whose X-Forwarded-For is trusted (NON-SENSITIVE)
    pub trusted_proxy_cidrs: Option<String>,

    /// Timeout applied to every outbound provider call (NON-SENSITIVE)
    #[envconfig(default = "10")]
    pub http_timeout_secs: u64,

    /// 🔒 SENSITIVE: Logfire write token, telemetry stays local without it
    pub logfire_token: Option<String>,
}

/// Deployment profile the process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Production,
    Development,
}

impl OperatingMode {
    pub fn from_env_name(env: &str) -> Self {
        match env.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_prod(self) -> bool {
        self == Self::Production
    }
}

/// Immutable runtime settings derived from [`AppConfig`].
#[derive(Debug)]
pub struct Settings {
    pub mode: OperatingMode,
    pub signature_mode: SignatureMode,
    /// When set every sender is allowed, and the decision is reported as bypassed
    pub authorization_bypass: bool,
    pub app_secret: String,
    pub verify_token: String,
    pub allow_list: AllowList,
    pub source_filter: SourceFilter,
    pub target_language: String,
}

impl Settings {
    /// Validates the raw environment values and builds the runtime settings.
    ///
    /// The operating mode only provides defaults: signature enforcement and
    /// authorization bypass are independent flags and either can be overridden.
    pub fn from_config(app_config: &AppConfig) -> anyhow::Result<Self> {
        let mode = OperatingMode::from_env_name(&app_config.env);

        let signature_mode = match app_config.signature_mode.as_deref() {
            Some(value) => value.parse::<SignatureMode>()?,
            None if mode.is_prod() => SignatureMode::Strict,
            None => SignatureMode::Relaxed,
        };
        let authorization_bypass = app_config.authorization_bypass.unwrap_or(!mode.is_prod());

        let app_secret = app_config.whatsapp_app_secret.clone().unwrap_or_default();
        if signature_mode == SignatureMode::Strict && app_secret.is_empty() {
            bail!("WHATSAPP_APP_SECRET is required when signatures are strictly enforced");
        }

        let country_code = CountryCode::parse(&app_config.default_country_code)?;
        let allow_list = AllowList::from_csv(
            app_config.authorized_senders.as_deref().unwrap_or_default(),
            &country_code,
        );

        let source_filter = SourceFilter::parse(
            app_config.webhook_source_cidrs.as_deref(),
            app_config.trusted_proxy_cidrs.as_deref(),
        )
        .context("invalid webhook source network configuration")?;

        let settings = Self {
            mode,
            signature_mode,
            authorization_bypass,
            app_secret,
            verify_token: app_config.whatsapp_verify_token.clone(),
            allow_list,
            source_filter,
            target_language: app_config.translation_target_language.clone(),
        };
        settings.warn_on_relaxed_production();

        Ok(settings)
    }

    fn warn_on_relaxed_production(&self) {
        if !self.mode.is_prod() {
            return;
        }
        if self.signature_mode == SignatureMode::Relaxed {
            logfire::warn!("Running in production with relaxed webhook signature enforcement");
        }
        if self.authorization_bypass {
            logfire::warn!("Running in production with sender authorization bypassed");
        }
        if !self.authorization_bypass && self.allow_list.is_empty() {
            logfire::warn!("Authorized sender list is empty, every sender will be denied");
        }
    }
}

impl AppConfig {
    /// Timeout for translation and dispatch calls
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn server_addr(&self) -> (String, u16) {
        (self.web_server_host.clone(), self.web_server_port)
    }
}

#[cfg(test)]
pub fn test_settings(signature_mode: SignatureMode, authorization_bypass: bool) -> Settings {
    let country_code = CountryCode::parse("1").unwrap();
    Settings {
        mode: OperatingMode::Development,
        signature_mode,
        authorization_bypass,
        app_secret: "test_secret".to_string(),
        verify_token: "verify123".to_string(),
        allow_list: AllowList::from_csv("15551234567", &country_code),
        source_filter: SourceFilter::default(),
        target_language: "en".to_string(),
    }
}
