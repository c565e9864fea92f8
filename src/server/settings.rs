//! Delivery settings endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::AppState;
use crate::config::{DeliverySettings, SettingsError};

impl IntoResponse for SettingsError {
    fn into_response(self) -> Response {
        let status = match &self {
            SettingsError::InvalidUrl { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SettingsError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"ok": false, "error": self.to_string()}))).into_response()
    }
}

/// Settings in effect, environment overrides applied.
pub async fn get_settings_handler(State(app_state): State<AppState>) -> Json<DeliverySettings> {
    Json(app_state.relay().settings())
}

/// Replaces the stored settings. Omitted or blank fields are cleared.
pub async fn put_settings_handler(
    State(app_state): State<AppState>,
    Json(settings): Json<DeliverySettings>,
) -> Result<Json<DeliverySettings>, SettingsError> {
    app_state.relay().update_settings(settings).map(Json)
}
