use logfire::config::{MetricsOptions, SendToLogfire};

/// Configures logfire as the tracing subscriber and metrics pipeline.
///
/// Telemetry is exported only when a token is available; otherwise events are
/// printed to the console.
pub fn setup_logfire(token: Option<&str>) -> anyhow::Result<logfire::ShutdownHandler> {
    let send_to_logfire = match token {
        Some(_) => SendToLogfire::Yes,
        None => SendToLogfire::No,
    };

    let mut builder = logfire::configure()
        .install_panic_handler()
        .with_metrics(Some(MetricsOptions::default()))
        .send_to_logfire(send_to_logfire);

    if let Some(token) = token {
        builder = builder.with_token(token);
    }

    Ok(builder.finish()?)
}
