//! Outbound events for notification and UI layers.
//!
//! Two streams leave the core:
//!
//! - [`Acknowledgment`]: one per number newly recorded in the sent-log.
//! - [`StatusEvent`]: one per network delivery attempt, success or failure.
//!
//! Both are fan-out broadcasts. Publishing never blocks and never fails the
//! operation that produced the event; slow subscribers lag and drop events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::delivery::LeadOrigin;
use crate::types::MobileNumber;

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// A number was newly recorded as delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgment {
    pub mobile: MobileNumber,
    pub recorded_at: DateTime<Utc>,
}

/// Result of one network delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Emitted after every network delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub mobile: MobileNumber,
    pub outcome: AttemptOutcome,
    /// Lead summary on success, HTTP status or transport error on failure.
    pub detail: String,
    pub origin: LeadOrigin,
}

/// Publisher side of both event streams.
///
/// Cloning is cheap; all clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    acks: broadcast::Sender<Acknowledgment>,
    status: broadcast::Sender<StatusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (acks, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { acks, status }
    }

    pub fn acknowledge(&self, mobile: &MobileNumber) {
        // No subscribers is fine.
        let _ = self.acks.send(Acknowledgment {
            mobile: mobile.clone(),
            recorded_at: Utc::now(),
        });
    }

    pub fn status(&self, event: StatusEvent) {
        let _ = self.status.send(event);
    }

    pub fn subscribe_acks(&self) -> broadcast::Receiver<Acknowledgment> {
        self.acks.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }
}
