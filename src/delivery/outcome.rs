//! What a delivery attempt produced.
//!
//! The pipeline never returns `Err`: every path ends in a [`DeliveryOutcome`],
//! and [`SubmitResponse`] is the `{ ok, error?, status }` shape callers see.

use serde::{Deserialize, Serialize};

use super::transport::ResponseBody;
use crate::types::MobileNumber;

/// Where a lead entered the pipeline from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadOrigin {
    /// A new capture. Failed deliveries are queued for one retry.
    Fresh,
    /// A redelivery from the retry queue. Failed deliveries are dropped.
    Queue,
}

/// Wire codes for terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NoEndpoint,
    InvalidMobile,
    Transport,
    Persistence,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::NoEndpoint => "NO_ENDPOINT",
            FailureKind::InvalidMobile => "INVALID_MOBILE",
            FailureKind::Transport => "TRANSPORT_FAILURE",
            FailureKind::Persistence => "PERSISTENCE_FAILURE",
        }
    }
}

/// A delivery that did not end in `Delivered` or `Duplicate`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub kind: FailureKind,
    /// Absent when the mobile never normalized.
    pub mobile: Option<MobileNumber>,
    pub detail: String,
    /// True when the lead now sits in the retry queue.
    pub retry_scheduled: bool,
}

impl DeliveryFailure {
    pub(crate) fn new(kind: FailureKind, mobile: Option<MobileNumber>, detail: impl Into<String>) -> Self {
        DeliveryFailure {
            kind,
            mobile,
            detail: detail.into(),
            retry_scheduled: false,
        }
    }

    /// Human-readable status line.
    pub fn status(&self) -> &'static str {
        match self.kind {
            FailureKind::NoEndpoint => "no destination configured",
            FailureKind::InvalidMobile => "invalid mobile number",
            FailureKind::Transport if self.retry_scheduled => "delivery failed, retry scheduled",
            FailureKind::Transport => "delivery failed, lead dropped",
            FailureKind::Persistence => "persistence failure",
        }
    }
}

/// Result of running one lead through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The endpoint accepted the lead and the sent-log recorded it.
    Delivered {
        mobile: MobileNumber,
        response: ResponseBody,
    },
    /// The number is already in the sent-log.
    Duplicate { mobile: MobileNumber },
    Failed(DeliveryFailure),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DeliveryOutcome::Duplicate { .. })
    }

    pub fn failure(&self) -> Option<&DeliveryFailure> {
        match self {
            DeliveryOutcome::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Duplicate { .. } => "duplicate, skipped",
            DeliveryOutcome::Failed(f) => f.status(),
        }
    }
}

/// Caller-facing summary of a submission.
///
/// `error` is the failure code (`NO_ENDPOINT`, ...), except for transport
/// failures where it is the transport detail itself (`HTTP 500`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub status: String,
}

impl From<&DeliveryOutcome> for SubmitResponse {
    fn from(outcome: &DeliveryOutcome) -> Self {
        let (error, detail) = match outcome.failure() {
            None => (None, None),
            Some(f) if f.kind == FailureKind::Transport => (Some(f.detail.clone()), None),
            Some(f) => (Some(f.kind.code().to_string()), Some(f.detail.clone())),
        };
        SubmitResponse {
            ok: error.is_none(),
            error,
            detail,
            status: outcome.status().to_string(),
        }
    }
}
