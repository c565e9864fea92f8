//! HTTP control surface for the lead relay.
//!
//! # Endpoints
//!
//! - `POST /leads` - Submits one lead (JSON candidate lead)
//! - `POST /capture` - Extracts leads from page text and submits each
//! - `POST /queue/drain` - Drains the retry queue
//! - `GET /queue` - Lists queued leads
//! - `GET /sent/{mobile}` - Whether a number was already delivered
//! - `GET /settings`, `PUT /settings` - Reads or replaces delivery settings
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use crate::relay::LeadRelay;

pub mod health;
pub mod leads;
pub mod queue;
pub mod settings;

pub use health::health_handler;
pub use leads::{capture_handler, submit_handler};
pub use queue::{drain_handler, queue_handler, sent_handler};
pub use settings::{get_settings_handler, put_settings_handler};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<LeadRelay>,
}

impl AppState {
    pub fn new(relay: Arc<LeadRelay>) -> Self {
        AppState { inner: relay }
    }

    pub fn relay(&self) -> &LeadRelay {
        &self.inner
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/leads", post(submit_handler))
        .route("/capture", post(capture_handler))
        .route("/queue", get(queue_handler))
        .route("/queue/drain", post(drain_handler))
        .route("/sent/{mobile}", get(sent_handler))
        .route(
            "/settings",
            get(get_settings_handler).put(put_settings_handler),
        )
        .route("/health", get(health_handler))
        .with_state(app_state)
}


#[cfg(test)]
mod integration_tests {
    use super::test_support::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn health_returns_200() {
        let (app, _relay, _dir) = test_app(None);

        let response = app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (app, _relay, _dir) = test_app(None);
        let response = app.oneshot(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Submit fails, queue shows it, drain delivers it, sent lookup confirms.
    #[tokio::test]
    async fn submit_queue_drain_sent_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let (app, _relay, _dir) = test_app(Some(server.uri()));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/leads", &json!({"mobile": "9812345678"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "delivery failed, retry scheduled");

        let queue = body_json(app.clone().oneshot(get("/queue")).await.unwrap()).await;
        assert_eq!(queue["pending"], 1);
        assert_eq!(queue["leads"][0]["mobile"], "9812345678");

        let response = app
            .clone()
            .oneshot(json_request("POST", "/queue/drain", &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["ok"], true);
        assert_eq!(report["delivered"], 1);
        assert_eq!(report["alreadyRunning"], false);

        let sent = body_json(app.oneshot(get("/sent/919812345678")).await.unwrap()).await;
        assert_eq!(sent, json!({"mobile": "9812345678", "sent": true}));
    }
}
