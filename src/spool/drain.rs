//! Draining the retry queue.
//!
//! On startup (and on explicit request) queued leads are taken from the head
//! one at a time and redelivered with a pause between attempts. A redelivery
//! that fails is dropped rather than queued again, so a lead gets at most one
//! retry.
//!
//! Only one drain loop runs at a time. A trigger that arrives while a loop is
//! running returns at once with `already_running` set; the running loop keeps
//! going until the queue is empty, so nothing is missed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::retry_queue::Result;
use crate::delivery::{DeliveryOutcome, DeliveryPipeline};

/// Counts from one drain run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Failed redeliveries. These leads were dropped.
    pub failed: usize,
    /// Leads already delivered by the time their turn came.
    pub skipped: usize,
    /// Another drain was running, so this trigger did nothing.
    pub already_running: bool,
}

/// Redelivers queued leads.
#[derive(Debug)]
pub struct QueueDrainer {
    pipeline: Arc<DeliveryPipeline>,
    delay: Duration,
    running: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

impl QueueDrainer {
    /// `delay` is the pause between attempts. Cancelling `shutdown` stops a
    /// drain between leads; the lead in progress finishes first.
    pub fn new(pipeline: Arc<DeliveryPipeline>, delay: Duration, shutdown: CancellationToken) -> Self {
        QueueDrainer {
            pipeline,
            delay,
            running: tokio::sync::Mutex::new(()),
            shutdown,
        }
    }

    /// Runs the drain loop until the queue is empty or shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if removing a lead from the queue could not be
    /// persisted. The lead stays queued.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport> {
        let Ok(_running) = self.running.try_lock() else {
            debug!("Drain already running");
            return Ok(DrainReport {
                already_running: true,
                ..DrainReport::default()
            });
        };

        let queue = self.pipeline.queue();
        let mut report = DrainReport::default();
        if !queue.is_empty() {
            info!(pending = queue.len(), "Processing retry queue");
        }

        loop {
            if self.shutdown.is_cancelled() {
                info!(remaining = queue.len(), "Drain stopped by shutdown");
                break;
            }
            let Some(lead) = queue.dequeue_front()? else {
                break;
            };

            report.attempted += 1;
            match self.pipeline.redeliver(lead).await {
                DeliveryOutcome::Delivered { .. } => report.delivered += 1,
                DeliveryOutcome::Duplicate { .. } => report.skipped += 1,
                DeliveryOutcome::Failed(_) => report.failed += 1,
            }

            if !queue.is_empty() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                skipped = report.skipped,
                "Retry queue drained"
            );
        }
        Ok(report)
    }
}
