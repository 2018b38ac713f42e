use derive_more::{Display, Error};
use ntex::{http, web};

/// Errors returned to the caller of the webhook endpoints.
///
/// Anything that happens after a delivery is acknowledged never maps to one
/// of these; it only shows up in logs and metrics.
#[derive(Debug, Display, Error)]
pub enum WebhookError {
    #[display("malformed webhook payload: {_0}")]
    MalformedPayload(#[error(not(source))] String),
    #[display("missing hub.mode or hub.verify_token")]
    MissingVerificationParams,
    Forbidden,
    #[display("webhook processing is shutting down")]
    ShuttingDown,
}

impl web::error::WebResponseError for WebhookError {
    fn error_response(&self, _: &web::HttpRequest) -> web::HttpResponse {
        logfire::warn!(
            "Webhook request rejected: {error}",
            error = self.to_string()
        );

        web::HttpResponse::build(self.status_code())
            .set_header("content-type", "text/plain; charset=utf-8")
            .body(self.to_string())
    }

    fn status_code(&self) -> http::StatusCode {
        match *self {
            WebhookError::MalformedPayload(_) => http::StatusCode::BAD_REQUEST,
            WebhookError::MissingVerificationParams => http::StatusCode::BAD_REQUEST,
            WebhookError::Forbidden => http::StatusCode::FORBIDDEN,
            WebhookError::ShuttingDown => http::StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
