//! Lead submission endpoints.
//!
//! `POST /leads` answers with the `{ ok, error?, detail?, status }` shape and an HTTP
//! status that reflects the outcome:
//!
//! | Outcome                              | Status |
//! |--------------------------------------|--------|
//! | delivered, duplicate                 | 200    |
//! | transport failure, retry scheduled   | 202    |
//! | transport failure, lead dropped      | 502    |
//! | no endpoint configured               | 503    |
//! | invalid mobile                       | 422    |
//! | persistence failure                  | 500    |

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use super::AppState;
use crate::capture::CapturePage;
use crate::delivery::{DeliveryOutcome, FailureKind, SubmitResponse};
use crate::types::CandidateLead;

/// HTTP status for a pipeline outcome.
pub fn outcome_status(outcome: &DeliveryOutcome) -> StatusCode {
    let Some(failure) = outcome.failure() else {
        return StatusCode::OK;
    };
    match failure.kind {
        FailureKind::Transport if failure.retry_scheduled => StatusCode::ACCEPTED,
        FailureKind::Transport => StatusCode::BAD_GATEWAY,
        FailureKind::NoEndpoint => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::InvalidMobile => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn submit_handler(
    State(app_state): State<AppState>,
    Json(candidate): Json<CandidateLead>,
) -> (StatusCode, Json<SubmitResponse>) {
    let outcome = app_state.relay().submit(candidate).await;
    (outcome_status(&outcome), Json(SubmitResponse::from(&outcome)))
}

#[derive(Debug, Serialize)]
pub struct CapturedResult {
    pub mobile: String,
    #[serde(flatten)]
    pub response: SubmitResponse,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub captured: usize,
    pub results: Vec<CapturedResult>,
}

/// Runs text capture over the page and submits every new lead.
///
/// Always 200: per-lead outcomes are in the body.
pub async fn capture_handler(
    State(app_state): State<AppState>,
    Json(page): Json<CapturePage>,
) -> Json<CaptureResponse> {
    let captured = app_state.relay().capture(&page).await;
    let results: Vec<CapturedResult> = captured
        .iter()
        .map(|c| CapturedResult {
            mobile: c.lead.mobile.clone(),
            response: SubmitResponse::from(&c.outcome),
        })
        .collect();
    Json(CaptureResponse {
        captured: results.len(),
        results,
    })
}
