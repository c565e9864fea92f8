//! Retry queue and sent-log inspection.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::spool::{DrainReport, QueueError};
use crate::types::{Lead, MobileError, MobileNumber};

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": self.to_string()})),
        )
            .into_response()
    }
}

impl IntoResponse for MobileError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"ok": false, "error": self.to_string()})),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct DrainResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: DrainReport,
}

/// Drains the retry queue, returning when the drain finishes.
///
/// If a drain is already running this returns at once with
/// `alreadyRunning: true`.
pub async fn drain_handler(
    State(app_state): State<AppState>,
) -> Result<Json<DrainResponse>, QueueError> {
    let report = app_state.relay().drain().await?;
    Ok(Json(DrainResponse { ok: true, report }))
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub pending: usize,
    pub leads: Vec<Lead>,
}

pub async fn queue_handler(State(app_state): State<AppState>) -> Json<QueueResponse> {
    let leads = app_state.relay().queued();
    Json(QueueResponse {
        pending: leads.len(),
        leads,
    })
}

#[derive(Debug, Serialize)]
pub struct SentResponse {
    pub mobile: MobileNumber,
    pub sent: bool,
}

/// Reports whether a number is in the sent-log. Any accepted spelling of the
/// number works (`+91 98123 45678`, `9812345678`, ...).
pub async fn sent_handler(
    State(app_state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<SentResponse>, MobileError> {
    let mobile = MobileNumber::parse(&raw)?;
    let sent = app_state.relay().is_sent(&mobile);
    Ok(Json(SentResponse { mobile, sent }))
}
