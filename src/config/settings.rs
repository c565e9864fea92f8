//! Delivery settings: where leads go and which license key travels with them.
//!
//! Settings live in `settings.json` in the state directory and are read on
//! every delivery, so an update takes effect for the next lead without a
//! restart. Values from the environment (see [`super::RelayConfig`]) override
//! whatever is stored.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::persistence::snapshot::{SnapshotError, save_snapshot_atomic, try_load_snapshot};

/// File name of the settings record inside the state directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Errors from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid webhook URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("settings persistence failed: {0}")]
    Persistence(#[from] SnapshotError),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Delivery target configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

impl DeliverySettings {
    /// Trims values and turns blanks into `None`.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        DeliverySettings {
            webhook_url: clean(self.webhook_url),
            license_key: clean(self.license_key),
        }
    }

    /// Fields set in `overrides` replace ours.
    pub fn overlay(self, overrides: &DeliverySettings) -> Self {
        DeliverySettings {
            webhook_url: overrides.webhook_url.clone().or(self.webhook_url),
            license_key: overrides.license_key.clone().or(self.license_key),
        }
    }

    /// Checks that the webhook URL, if any, is an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };
        let parsed = Url::parse(url).map_err(|e| SettingsError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(SettingsError::InvalidUrl {
                url: url.clone(),
                reason: format!("scheme '{other}' not allowed, use http or https"),
            }),
        }
    }
}

/// Owner of the persisted delivery settings.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    stored: Mutex<DeliverySettings>,
    overrides: DeliverySettings,
}

impl SettingsStore {
    /// Opens the settings in `state_dir`. `overrides` win over stored values.
    pub fn open(state_dir: &Path, overrides: DeliverySettings) -> Result<Self> {
        let path = state_dir.join(SETTINGS_FILE);
        let stored: DeliverySettings = try_load_snapshot(&path)?.unwrap_or_default();
        Ok(SettingsStore {
            path,
            stored: Mutex::new(stored),
            overrides: overrides.normalized(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DeliverySettings> {
        self.stored.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settings in effect for the next delivery.
    pub fn resolve(&self) -> DeliverySettings {
        self.lock().clone().overlay(&self.overrides)
    }

    /// Validates and persists new settings, returning the effective result.
    pub fn update(&self, settings: DeliverySettings) -> Result<DeliverySettings> {
        let settings = settings.normalized();
        settings.validate()?;

        let mut stored = self.lock();
        save_snapshot_atomic(&self.path, &settings)?;
        *stored = settings;
        info!(
            webhook_configured = stored.webhook_url.is_some(),
            "Delivery settings saved"
        );
        Ok(stored.clone().overlay(&self.overrides))
    }
}
