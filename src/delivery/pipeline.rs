//! The capture-dedup-delivery pipeline.
//!
//! Order of checks for every lead:
//!
//! 1. Fresh submissions are normalized; a bad number stops here.
//! 2. Sent-log hit: `Duplicate`, no network I/O. A delivery of the same
//!    number already in flight is waited for, then the sent-log is checked
//!    again.
//! 3. No webhook URL: `NO_ENDPOINT`, nothing queued.
//! 4. POST the payload (lead fields plus `date` and `licenseKey`).
//! 5. 2xx: record in the sent-log. Otherwise a fresh lead is queued for one
//!    retry and a queued lead is dropped.
//!
//! The sent-log is written at most once per lead and only after a 2xx.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, instrument, warn};

use super::outcome::{DeliveryFailure, DeliveryOutcome, FailureKind, LeadOrigin};
use super::transport::WebhookClient;
use crate::config::SettingsStore;
use crate::events::{AttemptOutcome, EventBus, StatusEvent};
use crate::spool::{RetryQueue, SentLog};
use crate::types::{CandidateLead, Lead, MobileNumber};

type NumberLocks = Mutex<HashMap<MobileNumber, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive delivery rights for one number, held until dropped.
struct NumberLock<'a> {
    locks: &'a NumberLocks,
    mobile: MobileNumber,
    _guard: OwnedMutexGuard<()>,
}

impl<'a> NumberLock<'a> {
    /// Waits for any delivery of the same number to finish.
    async fn acquire(locks: &'a NumberLocks, mobile: &MobileNumber) -> Self {
        let lock = {
            let mut held = locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(held.entry(mobile.clone()).or_default())
        };
        NumberLock {
            locks,
            mobile: mobile.clone(),
            _guard: lock.lock_owned().await,
        }
    }
}

impl Drop for NumberLock<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Two references: the map's and our guard's. Any more are waiters.
        if held
            .get(&self.mobile)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            held.remove(&self.mobile);
        }
    }
}

/// Builds the outbound JSON body: every lead field, plus `date` and, when
/// configured, `licenseKey`. Those two always win over same-named extra keys.
pub fn build_payload(
    lead: &Lead,
    date: DateTime<Utc>,
    license_key: Option<&str>,
) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(lead)?;
    if let Value::Object(map) = &mut value {
        map.insert(
            "date".to_string(),
            Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        match license_key {
            Some(key) => {
                map.insert("licenseKey".to_string(), Value::String(key.to_string()));
            }
            None => {
                map.remove("licenseKey");
            }
        }
    }
    Ok(value)
}

/// Delivers leads to the configured endpoint.
#[derive(Debug)]
pub struct DeliveryPipeline {
    sent_log: Arc<SentLog>,
    queue: Arc<RetryQueue>,
    settings: Arc<SettingsStore>,
    client: WebhookClient,
    events: EventBus,
    in_flight: NumberLocks,
}

impl DeliveryPipeline {
    pub fn new(
        sent_log: Arc<SentLog>,
        queue: Arc<RetryQueue>,
        settings: Arc<SettingsStore>,
        client: WebhookClient,
        events: EventBus,
    ) -> Self {
        DeliveryPipeline {
            sent_log,
            queue,
            settings,
            client,
            events,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn sent_log(&self) -> &Arc<SentLog> {
        &self.sent_log
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Runs a freshly captured lead through the pipeline.
    pub async fn submit(&self, candidate: CandidateLead) -> DeliveryOutcome {
        match candidate.normalize() {
            Ok(lead) => self.deliver(lead, LeadOrigin::Fresh).await,
            Err(e) => {
                warn!(error = %e, "Rejected lead with unusable mobile");
                DeliveryOutcome::Failed(DeliveryFailure::new(
                    FailureKind::InvalidMobile,
                    None,
                    e.to_string(),
                ))
            }
        }
    }

    /// Redelivers a lead taken from the retry queue. A failure drops it.
    pub async fn redeliver(&self, lead: Lead) -> DeliveryOutcome {
        self.deliver(lead, LeadOrigin::Queue).await
    }

    #[instrument(skip(self, lead), fields(mobile = %lead.mobile))]
    async fn deliver(&self, lead: Lead, origin: LeadOrigin) -> DeliveryOutcome {
        let mobile = lead.mobile.clone();

        if self.sent_log.contains(&mobile) {
            info!("Duplicate in persistent log, skipping");
            return DeliveryOutcome::Duplicate { mobile };
        }
        let _in_flight = NumberLock::acquire(&self.in_flight, &mobile).await;
        // A delivery of this number may have finished while we waited.
        if self.sent_log.contains(&mobile) {
            info!("Delivered while waiting, skipping");
            return DeliveryOutcome::Duplicate { mobile };
        }

        let settings = self.settings.resolve();
        let Some(url) = settings.webhook_url.as_deref() else {
            warn!("No webhook URL configured");
            return DeliveryOutcome::Failed(DeliveryFailure::new(
                FailureKind::NoEndpoint,
                Some(mobile),
                "webhook URL not configured",
            ));
        };

        let attempt = match build_payload(&lead, Utc::now(), settings.license_key.as_deref()) {
            Ok(payload) => self
                .client
                .post(url, &payload)
                .await
                .map_err(|e| e.detail()),
            Err(e) => Err(format!("payload encoding failed: {e}")),
        };

        match attempt {
            Ok(response) => {
                debug!(response = ?response, "Lead accepted by endpoint");
                self.events.status(StatusEvent {
                    mobile: mobile.clone(),
                    outcome: AttemptOutcome::Success,
                    detail: lead.summary(),
                    origin,
                });
                match self.sent_log.record(&mobile) {
                    Ok(_) => DeliveryOutcome::Delivered { mobile, response },
                    Err(e) => {
                        error!(error = %e, "Lead delivered but not recorded in sent-log");
                        DeliveryOutcome::Failed(DeliveryFailure::new(
                            FailureKind::Persistence,
                            Some(mobile),
                            format!("delivered but not recorded as sent: {e}"),
                        ))
                    }
                }
            }
            Err(detail) => {
                warn!(detail = %detail, "Delivery failed");
                self.events.status(StatusEvent {
                    mobile: mobile.clone(),
                    outcome: AttemptOutcome::Failure,
                    detail: detail.clone(),
                    origin,
                });
                self.after_failure(lead, origin, detail)
            }
        }
    }

    fn after_failure(&self, lead: Lead, origin: LeadOrigin, detail: String) -> DeliveryOutcome {
        let mobile = lead.mobile.clone();
        match origin {
            LeadOrigin::Fresh => match self.queue.enqueue(lead) {
                Ok(()) => DeliveryOutcome::Failed(DeliveryFailure {
                    kind: FailureKind::Transport,
                    mobile: Some(mobile),
                    detail,
                    retry_scheduled: true,
                }),
                Err(e) => {
                    error!(error = %e, "Failed lead could not be queued");
                    DeliveryOutcome::Failed(DeliveryFailure::new(
                        FailureKind::Persistence,
                        Some(mobile),
                        format!("lead not durably queued after {detail}: {e}"),
                    ))
                }
            },
            LeadOrigin::Queue => {
                warn!(detail = %detail, "Retry failed, dropping lead");
                DeliveryOutcome::Failed(DeliveryFailure::new(
                    FailureKind::Transport,
                    Some(mobile),
                    detail,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{ResponseBody, SubmitResponse};
    use crate::persistence::snapshot::temp_path;
    use crate::test_utils::{TestPipeline, mobile};
    use crate::types::LeadDetails;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn for_server(server: &MockServer) -> TestPipeline {
        TestPipeline::new(Some(server.uri()))
    }

    fn candidate(mobile: &str) -> CandidateLead {
        CandidateLead::new(mobile).with_details(LeadDetails {
            reg_no: "MH12AB1234".into(),
            source: "OLX/FB".into(),
            ..Default::default()
        })
    }

    async fn mount_status(server: &MockServer, status: u16) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn success_records_in_sent_log() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success"})))
            .expect(1)
            .mount(&server)
            .await;
        let h = for_server(&server);
        let mut acks = h.events.subscribe_acks();

        let outcome = h.pipeline.submit(candidate("+91 98123 45678")).await;

        assert!(outcome.is_delivered());
        assert!(h.sent_log().contains(&mobile("9812345678")));
        assert!(h.queue().is_empty());
        assert_eq!(acks.try_recv().unwrap().mobile, mobile("9812345678"));
    }

    #[tokio::test]
    async fn text_reply_still_counts_as_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Success"))
            .mount(&server)
            .await;
        let h = for_server(&server);

        let outcome = h.pipeline.submit(candidate("9812345678")).await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered { response: ResponseBody::Text(ref t), .. } if t == "Success"
        ));
    }

    #[tokio::test]
    async fn duplicate_makes_exactly_one_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let h = for_server(&server);

        assert!(h.pipeline.submit(candidate("9812345678")).await.is_delivered());
        let second = h.pipeline.submit(candidate("919812345678")).await;

        assert!(second.is_duplicate());
        assert_eq!(second.status(), "duplicate, skipped");
    }

    #[tokio::test]
    async fn missing_endpoint_short_circuits() {
        let h = TestPipeline::new(None);

        let outcome = h.pipeline.submit(candidate("9812345678")).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::NoEndpoint);
        assert!(!failure.retry_scheduled);
        assert_eq!(outcome.status(), "no destination configured");
        assert!(h.queue().is_empty());
        assert!(h.sent_log().is_empty());
    }

    #[tokio::test]
    async fn missing_endpoint_answers_with_bare_code() {
        let h = TestPipeline::new(None);

        let outcome = h.pipeline.submit(candidate("9812345678")).await;
        let response = SubmitResponse::from(&outcome);

        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("NO_ENDPOINT"));
        assert_eq!(response.detail.as_deref(), Some("webhook URL not configured"));
    }

    #[tokio::test]
    async fn invalid_mobile_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let h = for_server(&server);

        let outcome = h.pipeline.submit(candidate("1234567890")).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidMobile);
        assert_eq!(failure.mobile, None);
        assert!(h.queue().is_empty());
    }

    #[tokio::test]
    async fn fresh_failure_is_queued() {
        let server = MockServer::start().await;
        mount_status(&server, 503).await;
        let h = for_server(&server);
        let mut status = h.events.subscribe_status();

        let outcome = h.pipeline.submit(candidate("9812345678")).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(failure.detail, "HTTP 503");
        assert!(failure.retry_scheduled);
        assert_eq!(h.queue().len(), 1);
        assert!(h.sent_log().is_empty());

        let event = status.try_recv().unwrap();
        assert_eq!(event.outcome, AttemptOutcome::Failure);
        assert_eq!(event.detail, "HTTP 503");
        assert_eq!(event.origin, LeadOrigin::Fresh);
    }

    #[tokio::test]
    async fn queued_failure_is_dropped() {
        let server = MockServer::start().await;
        mount_status(&server, 500).await;
        let h = for_server(&server);
        let lead = candidate("9812345678").normalize().unwrap();

        let outcome = h.pipeline.redeliver(lead).await;

        assert!(!outcome.failure().unwrap().retry_scheduled);
        assert_eq!(outcome.status(), "delivery failed, lead dropped");
        assert!(h.queue().is_empty());
        assert!(h.sent_log().is_empty());
    }

    /// 500 on first contact, 200 on the replay, then a resubmission is a
    /// duplicate: two network calls in total.
    #[tokio::test]
    async fn failure_then_replay_then_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let h = for_server(&server);

        let first = h.pipeline.submit(candidate("9812345678")).await;
        assert!(first.failure().unwrap().retry_scheduled);
        assert_eq!(h.queue().len(), 1);

        let queued = h.queue().dequeue_front().unwrap().unwrap();
        assert!(h.pipeline.redeliver(queued).await.is_delivered());
        assert!(h.sent_log().contains(&mobile("9812345678")));
        assert!(h.queue().is_empty());

        assert!(h.pipeline.submit(candidate("9812345678")).await.is_duplicate());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn payload_carries_date_license_and_extra_keys() {
        let server = MockServer::start().await;
        mount_status(&server, 200).await;
        let h = for_server(&server);
        let mut details = LeadDetails {
            car_model: "Swift VXI".into(),
            ..Default::default()
        };
        details.extra.insert("isOwner".into(), json!(true));
        details.extra.insert("date".into(), json!("stale"));

        h.pipeline
            .submit(CandidateLead::new("9812345678").with_details(details))
            .await;

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["mobile"], "9812345678");
        assert_eq!(body["carModel"], "Swift VXI");
        assert_eq!(body["isOwner"], true);
        assert_eq!(body["licenseKey"], "TEST-KEY");
        let date = body["date"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(date).is_ok());
        assert!(date.ends_with('Z'));
    }

    #[test]
    fn payload_without_license_omits_the_key() {
        let lead = candidate("9812345678").normalize().unwrap();
        let payload = build_payload(&lead, Utc::now(), None).unwrap();
        assert!(payload.get("licenseKey").is_none());
        assert_eq!(payload["regNo"], "MH12AB1234");
    }

    #[tokio::test]
    async fn failed_enqueue_is_a_persistence_failure() {
        let server = MockServer::start().await;
        mount_status(&server, 500).await;
        let h = for_server(&server);
        std::fs::create_dir(temp_path(h.queue().path())).unwrap();

        let outcome = h.pipeline.submit(candidate("9812345678")).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Persistence);
        assert!(failure.detail.contains("not durably queued"));
        assert!(h.queue().is_empty());
    }

    #[tokio::test]
    async fn failed_record_after_success_is_not_queued() {
        let server = MockServer::start().await;
        mount_status(&server, 200).await;
        let h = for_server(&server);
        std::fs::create_dir(temp_path(h.sent_log().path())).unwrap();

        let outcome = h.pipeline.submit(candidate("9812345678")).await;

        assert_eq!(outcome.failure().unwrap().kind, FailureKind::Persistence);
        assert!(h.queue().is_empty());
        assert!(!h.sent_log().contains(&mobile("9812345678")));
    }

    #[tokio::test]
    async fn concurrent_submissions_of_one_number_send_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;
        let h = for_server(&server);

        let (a, b) = tokio::join!(
            h.pipeline.submit(candidate("9812345678")),
            h.pipeline.submit(candidate("+91-9812345678")),
        );

        let delivered = [&a, &b].iter().filter(|o| o.is_delivered()).count();
        let duplicates = [&a, &b].iter().filter(|o| o.is_duplicate()).count();
        assert_eq!((delivered, duplicates), (1, 1));
    }

    /// The second submission waits out a failing first one and makes its own
    /// attempt instead of reporting a duplicate.
    #[tokio::test]
    async fn submission_behind_a_failed_attempt_is_not_a_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;
        let h = for_server(&server);
        let queued = candidate("9812345678").normalize().unwrap();

        let (replay, fresh) = tokio::join!(h.pipeline.redeliver(queued), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.pipeline.submit(candidate("9812345678")).await
        });

        assert!(!replay.failure().unwrap().retry_scheduled);
        let failure = fresh.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.retry_scheduled);
        assert_eq!(h.queue().len(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        assert!(h.pipeline.in_flight.lock().unwrap().is_empty());
    }
}
