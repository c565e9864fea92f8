//! HTTP transport to the lead endpoint.
//!
//! One POST per attempt, JSON body, bounded by the client timeout. Any 2xx is
//! success; everything else (non-2xx, connect error, timeout) is a
//! [`TransportError`]. The transport never retries; retry policy belongs to
//! the pipeline and the queue.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors from a single delivery attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}")]
    Status { status: u16, body: String },

    /// The request never produced a response (connect failure, timeout, ...).
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

impl TransportError {
    /// Short text for status events and failure outcomes.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Body of a 2xx response.
///
/// The endpoint's body is informational only; success is decided by status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        }
    }
}

/// POSTs JSON payloads to the configured endpoint.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    /// Builds a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(WebhookClient { client })
    }

    /// Sends `payload` to `url`.
    ///
    /// A 2xx body that fails to read is treated as empty text: the endpoint
    /// already accepted the lead.
    pub async fn post<P: Serialize + ?Sized>(&self, url: &str, payload: &P) -> Result<ResponseBody> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        debug!(status = %status, "Endpoint responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.unwrap_or_default();
        Ok(ResponseBody::parse(text))
    }
}
