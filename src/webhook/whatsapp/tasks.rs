//! Background processing of acknowledged webhook deliveries.
//!
//! The receive route only enqueues a [`Delivery`] and answers Meta right away.
//! A single supervisor task drains the queue and runs every delivery through
//! the [`WebhookPipeline`] concurrently. On shutdown the queue is closed and
//! whatever was already accepted is still processed.

use super::handler::{PipelineOutcome, WebhookPipeline};
use anyhow::Context;
use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use ntex::util::Bytes;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle, JoinSet},
};
use uuid::Uuid;

/// Webhook body as received, before any processing
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: Uuid,
    /// Exact bytes Meta signed
    pub raw_body: Bytes,
    pub signature: Option<String>,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(raw_body: Bytes, signature: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            raw_body,
            signature,
            payload,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Display, Error)]
#[display("delivery queue is closed")]
pub struct QueueClosed;

/// Sending half handed to the HTTP routes
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl DeliveryQueue {
    pub fn submit(&self, delivery: Delivery) -> Result<(), QueueClosed> {
        self.sender.send(delivery).map_err(|_| QueueClosed)
    }
}

pub fn delivery_channel() -> (DeliveryQueue, mpsc::UnboundedReceiver<Delivery>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (DeliveryQueue { sender }, receiver)
}

pub struct BackgroundProcessor {
    supervisor: JoinHandle<usize>,
    shutdown: oneshot::Sender<()>,
}

impl BackgroundProcessor {
    pub fn start(
        pipeline: Arc<WebhookPipeline>,
        receiver: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(pipeline, receiver, shutdown_rx));

        Self {
            supervisor,
            shutdown,
        }
    }

    /// Stops intake, waits for every accepted delivery and returns how many ran.
    pub async fn shutdown(self) -> anyhow::Result<usize> {
        // Supervisor may already be gone if every queue handle was dropped
        let _ = self.shutdown.send(());

        let processed = self
            .supervisor
            .await
            .context("delivery supervisor stopped abnormally")?;

        logfire::info!(
            "Background processor drained, {processed} deliveries processed",
            processed = processed as i64
        );

        Ok(processed)
    }
}

async fn supervise(
    pipeline: Arc<WebhookPipeline>,
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> usize {
    let mut in_flight = JoinSet::new();
    let mut processed = 0;

    loop {
        tokio::select! {
            delivery = receiver.recv() => match delivery {
                Some(delivery) => spawn_delivery(&mut in_flight, &pipeline, delivery),
                None => break,
            },
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                processed += 1;
                log_run_result(result);
            }
            _ = &mut shutdown_rx => break,
        }
    }

    receiver.close();
    while let Some(delivery) = receiver.recv().await {
        spawn_delivery(&mut in_flight, &pipeline, delivery);
    }

    while let Some(result) = in_flight.join_next().await {
        processed += 1;
        log_run_result(result);
    }

    processed
}

fn spawn_delivery(
    in_flight: &mut JoinSet<PipelineOutcome>,
    pipeline: &Arc<WebhookPipeline>,
    delivery: Delivery,
) {
    let pipeline = Arc::clone(pipeline);
    in_flight.spawn(async move { pipeline.process(delivery).await });
}

fn log_run_result(result: Result<PipelineOutcome, JoinError>) {
    match result {
        Ok(outcome) => {
            logfire::debug!("Delivery finished as {outcome}", outcome = outcome.label());
        }
        Err(e) if e.is_panic() => {
            logfire::error!(
                "Delivery processing panicked: {error}",
                error = e.to_string()
            );
        }
        Err(e) => {
            logfire::warn!(
                "Delivery processing was cancelled: {error}",
                error = e.to_string()
            );
        }
    }
}
