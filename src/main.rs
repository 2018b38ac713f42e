//! # wa-translate
//!
//! WhatsApp webhook service that translates inbound text messages and replies
//! to the sender with the translation.

pub mod config;
pub mod consts;
pub mod errors;
pub mod logger;
pub mod metric;
pub mod server;
pub mod services;
pub mod webhook;

use anyhow::Context;
use envconfig::Envconfig;
use std::sync::Arc;
use webhook::whatsapp::{client, handler, tasks};

#[ntex::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::AppConfig::init_from_env().context("failed to load app config")?;

    // Initialize logging and metrics
    let shutdown_handler = logger::setup_logfire(app_config.logfire_token.as_deref())?;

    let settings = Arc::new(config::Settings::from_config(&app_config)?);
    logfire::info!(
        "Loaded settings: {mode} mode, {signature_mode} signatures, {senders} authorized senders",
        mode = format!("{:?}", settings.mode),
        signature_mode = format!("{:?}", settings.signature_mode),
        senders = settings.allow_list.len() as i64
    );

    let translator = services::translation::GoogleTranslateHandler::new(&app_config)?;
    let messenger = client::WhatsAppClient::new(&app_config)?;
    let pipeline = Arc::new(handler::WebhookPipeline::new(
        Arc::clone(&settings),
        Box::new(translator),
        Box::new(messenger),
    ));

    let (queue, receiver) = tasks::delivery_channel();
    let processor = tasks::BackgroundProcessor::start(pipeline, receiver);

    let app_state = server::AppState { settings, queue };
    let server_result = server::configure_and_run_server(app_config.server_addr(), app_state).await;

    // Queue handles owned by the workers are gone once the server stops
    processor.shutdown().await?;
    shutdown_handler.shutdown()?;

    server_result
}
