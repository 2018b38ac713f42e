//! HTTP server setup and the handlers not linked to the webhook.

use crate::{config::Settings, webhook, webhook::whatsapp::tasks::DeliveryQueue};
use ntex::web;
use std::sync::Arc;

/// State shared with every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub queue: DeliveryQueue,
}

/// Liveness check
#[web::get("/")]
async fn index() -> impl web::Responder {
    web::HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("wa-translate is running")
}

/// Health check for load balancers
#[web::get("/health")]
async fn health() -> impl web::Responder {
    web::HttpResponse::Ok().json(&serde_json::json!({"status": "ok"}))
}

/// Configures and starts the web server, returning once it stops.
pub async fn configure_and_run_server(
    server_addr: (String, u16),
    app_state: AppState,
) -> anyhow::Result<()> {
    logfire::info!(
        "Starting web server on {host}:{port}",
        host = server_addr.0.clone(),
        port = server_addr.1 as i64
    );

    web::server(move || {
        web::App::new()
            .wrap(web::middleware::Logger::default())
            .state(app_state.clone())
            .configure(webhook::routes::whatsapp)
            .service((index, health))
    })
    .bind(server_addr)?
    .run()
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
