//! Process configuration.
//!
//! Everything here comes from environment variables, falling back to
//! defaults when a variable is unset or does not parse:
//!
//! | Variable                    | Default              |
//! |-----------------------------|----------------------|
//! | `LEAD_RELAY_STATE_DIR`      | `./lead-relay-state` |
//! | `LEAD_RELAY_LISTEN`         | `127.0.0.1:3000`     |
//! | `LEAD_RELAY_TIMEOUT_SECS`   | `15`                 |
//! | `LEAD_RELAY_DRAIN_DELAY_MS` | `500`                |
//! | `LEAD_RELAY_WEBHOOK_URL`    | unset                |
//! | `LEAD_RELAY_LICENSE_KEY`    | unset                |
//!
//! The last two override the persisted [`settings::DeliverySettings`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub mod settings;

pub use settings::{DeliverySettings, SettingsError, SettingsStore};

/// Default directory for durable state.
const DEFAULT_STATE_DIR: &str = "./lead-relay-state";

/// Default listen address for the control server.
const DEFAULT_LISTEN: ([u8; 4], u16) = ([127, 0, 0, 1], 3000);

/// Default timeout for one webhook POST.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default pause between redeliveries while draining the retry queue.
const DEFAULT_DRAIN_DELAY_MS: u64 = 500;

/// Configuration for a relay process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Directory holding the sent-log, retry queue, and settings.
    pub state_dir: PathBuf,

    /// Address the control server binds to.
    pub listen: SocketAddr,

    /// Timeout for a single delivery attempt. A timed-out attempt counts as a
    /// transport failure.
    pub request_timeout: Duration,

    /// Pause between redeliveries while draining.
    pub drain_delay: Duration,

    /// Settings that override the persisted ones.
    pub settings_overrides: DeliverySettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }
}

impl RelayConfig {
    /// Creates a configuration with default values and the given state dir.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        RelayConfig {
            state_dir: state_dir.into(),
            listen: SocketAddr::from(DEFAULT_LISTEN),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            drain_delay: Duration::from_millis(DEFAULT_DRAIN_DELAY_MS),
            settings_overrides: DeliverySettings::default(),
        }
    }

    /// Sets the pause between redeliveries.
    pub fn with_drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Creates a `RelayConfig` from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a `RelayConfig` from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let state_dir = lookup("LEAD_RELAY_STATE_DIR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string());

        let listen = lookup("LEAD_RELAY_LISTEN")
            .and_then(|s| s.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| SocketAddr::from(DEFAULT_LISTEN));

        let timeout_secs = lookup("LEAD_RELAY_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let drain_delay_ms = lookup("LEAD_RELAY_DRAIN_DELAY_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DRAIN_DELAY_MS);

        let settings_overrides = DeliverySettings {
            webhook_url: lookup("LEAD_RELAY_WEBHOOK_URL"),
            license_key: lookup("LEAD_RELAY_LICENSE_KEY"),
        }
        .normalized();

        RelayConfig {
            state_dir: PathBuf::from(state_dir),
            listen,
            request_timeout: Duration::from_secs(timeout_secs),
            drain_delay: Duration::from_millis(drain_delay_ms),
            settings_overrides,
        }
    }
}
