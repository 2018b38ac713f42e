//! WhatsApp webhook endpoint handlers
//!
//! The GET endpoint answers Meta's subscription handshake. The POST endpoint
//! acknowledges deliveries: it only checks that the body is a JSON object,
//! queues it with its signature header and returns `200`. Signature checks
//! and everything after them run in the background, so a failing delivery
//! never produces a non-2xx answer that would make Meta retry it.

use super::{source_filter::SourceFilter, tasks::Delivery};
use crate::{consts, errors::WebhookError, server::AppState};
use ntex::{util::Bytes, web};
use serde::Deserialize;
use std::net::IpAddr;

/// Query parameters for webhook verification
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Webhook verification endpoint (GET)
///
/// # Returns
/// - 200 with the challenge string if mode is `subscribe` and the token matches
/// - 400 if `hub.mode` or `hub.verify_token` is missing
/// - 403 otherwise
#[web::get("")]
pub async fn verify(
    query: web::types::Query<VerifyQuery>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    let mode = query.mode.as_deref();
    let verify_token = query.verify_token.as_deref();
    let (Some(mode), Some(verify_token)) = (mode, verify_token) else {
        return Err(WebhookError::MissingVerificationParams.into());
    };

    if mode != "subscribe" || verify_token != app_state.settings.verify_token {
        return Err(WebhookError::Forbidden.into());
    }

    logfire::info!("Webhook subscription verified");

    Ok(web::HttpResponse::Ok()
        .content_type("text/plain")
        .body(query.challenge.clone().unwrap_or_default()))
}

/// Webhook receiver endpoint (POST)
///
/// # Returns
/// - 200 `{"status":"received"}` once the delivery is queued
/// - 400 if the body is not a JSON object
/// - 403 if source filtering is enabled and the client address is outside it
/// - 503 if the service is shutting down
#[web::post("")]
pub async fn receive(
    req: web::HttpRequest,
    body: Bytes,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    let peer = req.peer_addr().map(|addr| addr.ip());
    let forwarded_for = req
        .headers()
        .get(consts::FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok());
    check_delivery_source(&app_state.settings.source_filter, peer, forwarded_for)?;

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    if !payload.is_object() {
        let error = WebhookError::MalformedPayload("expected a JSON object".to_string());
        return Err(error.into());
    }

    let signature = req
        .headers()
        .get(consts::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let delivery = Delivery::new(body, signature, payload);
    let delivery_id = delivery.delivery_id.to_string();

    app_state
        .queue
        .submit(delivery)
        .map_err(|_| WebhookError::ShuttingDown)?;

    logfire::debug!(
        "Queued webhook delivery {delivery_id}",
        delivery_id = delivery_id
    );

    let ack = serde_json::json!({ "status": "received" });
    Ok(web::HttpResponse::Ok().json(&ack))
}

/// Refuses a delivery whose client address is outside the allowed networks.
///
/// `peer` is the direct TCP peer. `forwarded_for` is only consulted when that
/// peer is a trusted proxy.
fn check_delivery_source(
    source_filter: &SourceFilter,
    peer: Option<IpAddr>,
    forwarded_for: Option<&str>,
) -> Result<(), WebhookError> {
    if !source_filter.is_enabled() {
        return Ok(());
    }

    let client_ip = source_filter.client_ip(peer, forwarded_for);
    if source_filter.permits(client_ip) {
        return Ok(());
    }

    logfire::warn!(
        "Webhook delivery from outside allowed networks: {client}",
        client = client_ip.map(|ip| ip.to_string()).unwrap_or_default()
    );
    Err(WebhookError::Forbidden)
}
