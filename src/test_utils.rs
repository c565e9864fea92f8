//! Shared test fixtures and arbitrary generators for property-based testing.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tempfile::TempDir;

use crate::config::{DeliverySettings, SettingsStore};
use crate::delivery::{DeliveryPipeline, WebhookClient};
use crate::events::EventBus;
use crate::spool::{RetryQueue, SentLog};
use crate::types::{Lead, LeadDetails, MobileNumber};

pub fn arb_mobile() -> impl Strategy<Value = MobileNumber> {
    "[6-9][0-9]{9}".prop_map(|s| MobileNumber::parse(&s).unwrap())
}

pub fn mobile(s: &str) -> MobileNumber {
    MobileNumber::parse(s).unwrap()
}

pub fn lead(s: &str) -> Lead {
    Lead::new(
        mobile(s),
        LeadDetails {
            source: "OLX/FB".into(),
            ..Default::default()
        },
    )
}

/// A pipeline over a temporary state directory.
pub struct TestPipeline {
    pub dir: TempDir,
    pub events: EventBus,
    pub pipeline: Arc<DeliveryPipeline>,
}

impl TestPipeline {
    /// Delivers to `webhook_url` with license key `TEST-KEY`.
    pub fn new(webhook_url: Option<String>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let events = EventBus::new();
        let sent_log = Arc::new(SentLog::open(dir.path(), events.clone()).unwrap());
        let queue = Arc::new(RetryQueue::open(dir.path()).unwrap());
        let settings = Arc::new(
            SettingsStore::open(
                dir.path(),
                DeliverySettings {
                    webhook_url,
                    license_key: Some("TEST-KEY".into()),
                },
            )
            .unwrap(),
        );
        let client = WebhookClient::new(Duration::from_secs(5)).unwrap();
        let pipeline = Arc::new(DeliveryPipeline::new(
            sent_log,
            queue,
            settings,
            client,
            events.clone(),
        ));
        TestPipeline {
            dir,
            events,
            pipeline,
        }
    }

    pub fn queue(&self) -> &RetryQueue {
        self.pipeline.queue()
    }

    pub fn sent_log(&self) -> &SentLog {
        self.pipeline.sent_log()
    }
}
