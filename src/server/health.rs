//! Liveness probe.

use axum::http::StatusCode;

/// Returns 200 with the text "OK" while the server is accepting connections.
///
/// Says nothing about the webhook endpoint; a relay with no destination
/// configured is still live.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
