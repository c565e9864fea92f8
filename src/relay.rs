//! The assembled relay: stores, pipeline, drainer, and event streams.
//!
//! [`LeadRelay`] is what the binary and the HTTP layer talk to. It owns every
//! component and wires them over one state directory.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::{CapturePage, CaptureSession, extract_leads};
use crate::config::{DeliverySettings, RelayConfig, SettingsError, SettingsStore};
use crate::delivery::{DeliveryOutcome, DeliveryPipeline, TransportError, WebhookClient};
use crate::events::{Acknowledgment, AttemptOutcome, EventBus, StatusEvent};
use crate::spool::{DrainReport, QueueDrainer, QueueError, RetryQueue, SentLog, SentLogError};
use crate::types::{CandidateLead, Lead, MobileNumber};

/// Errors opening a relay.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to create state directory: {0}")]
    StateDir(#[from] std::io::Error),

    #[error(transparent)]
    SentLog(#[from] SentLogError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] TransportError),
}

/// One lead from a capture run and what happened to it.
#[derive(Debug, Clone)]
pub struct CapturedLead {
    pub lead: CandidateLead,
    pub outcome: DeliveryOutcome,
}

/// A running lead relay.
#[derive(Debug)]
pub struct LeadRelay {
    pipeline: Arc<DeliveryPipeline>,
    drainer: Arc<QueueDrainer>,
    events: EventBus,
    capture: Mutex<CaptureSession>,
    shutdown: CancellationToken,
}

impl LeadRelay {
    /// Opens (or creates) the state in `config.state_dir`.
    pub fn open(config: &RelayConfig) -> Result<Self, OpenError> {
        std::fs::create_dir_all(&config.state_dir)?;

        let events = EventBus::new();
        let sent_log = Arc::new(SentLog::open(&config.state_dir, events.clone())?);
        let queue = Arc::new(RetryQueue::open(&config.state_dir)?);
        let settings = Arc::new(SettingsStore::open(
            &config.state_dir,
            config.settings_overrides.clone(),
        )?);
        let client = WebhookClient::new(config.request_timeout)?;

        let capture = Mutex::new(CaptureSession::seeded_from(&sent_log));
        let pipeline = Arc::new(DeliveryPipeline::new(
            sent_log,
            queue,
            settings,
            client,
            events.clone(),
        ));
        let shutdown = CancellationToken::new();
        let drainer = Arc::new(QueueDrainer::new(
            Arc::clone(&pipeline),
            config.drain_delay,
            shutdown.clone(),
        ));

        info!(
            state_dir = %config.state_dir.display(),
            sent = pipeline.sent_log().len(),
            queued = pipeline.queue().len(),
            "Lead relay opened"
        );

        Ok(LeadRelay {
            pipeline,
            drainer,
            events,
            capture,
            shutdown,
        })
    }

    /// Delivers one lead.
    pub async fn submit(&self, candidate: CandidateLead) -> DeliveryOutcome {
        self.pipeline.submit(candidate).await
    }

    /// Extracts leads from `page` and submits each new one in page order.
    pub async fn capture(&self, page: &CapturePage) -> Vec<CapturedLead> {
        let leads = {
            let mut session = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
            extract_leads(page, &mut session)
        };

        let mut results = Vec::with_capacity(leads.len());
        for lead in leads {
            let outcome = self.pipeline.submit(lead.clone()).await;
            results.push(CapturedLead { lead, outcome });
        }
        results
    }

    /// Drains the retry queue once. See [`QueueDrainer::drain`].
    pub async fn drain(&self) -> Result<DrainReport, QueueError> {
        self.drainer.drain().await
    }

    /// Starts a drain in the background, as done at startup.
    pub fn spawn_drain(&self) -> JoinHandle<()> {
        let drainer = Arc::clone(&self.drainer);
        tokio::spawn(async move {
            if let Err(e) = drainer.drain().await {
                warn!(error = %e, "Startup drain failed");
            }
        })
    }

    pub fn is_sent(&self, mobile: &MobileNumber) -> bool {
        self.pipeline.sent_log().contains(mobile)
    }

    pub fn queued(&self) -> Vec<Lead> {
        self.pipeline.queue().snapshot()
    }

    pub fn settings(&self) -> DeliverySettings {
        self.pipeline.settings().resolve()
    }

    pub fn update_settings(&self, settings: DeliverySettings) -> Result<DeliverySettings, SettingsError> {
        self.pipeline.settings().update(settings)
    }

    pub fn subscribe_acks(&self) -> broadcast::Receiver<Acknowledgment> {
        self.events.subscribe_acks()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe_status()
    }

    /// Logs every acknowledgment and status event until shutdown.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut acks = self.subscribe_acks();
        let mut status = self.subscribe_status();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    ack = acks.recv() => match ack {
                        Ok(ack) => info!(mobile = %ack.mobile, "Lead acknowledged"),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Acknowledgment stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = status.recv() => match event {
                        Ok(event) => match event.outcome {
                            AttemptOutcome::Success => info!(
                                mobile = %event.mobile,
                                origin = ?event.origin,
                                detail = %event.detail,
                                "Lead sent"
                            ),
                            AttemptOutcome::Failure => warn!(
                                mobile = %event.mobile,
                                origin = ?event.origin,
                                detail = %event.detail,
                                "Lead send failed"
                            ),
                        },
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Status stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Stops the drainer between leads and the event logger.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
