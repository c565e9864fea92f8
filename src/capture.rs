//! Lead extraction from listing text.
//!
//! A capture source (browser extension, crawler, copy-paste) hands over the
//! visible text of a classified-ad page plus whatever it could read from the
//! page structure (title, location). Phone numbers are pulled out of the text
//! and each new one becomes a [`CandidateLead`] carrying the vehicle details
//! found on the same page.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::spool::SentLog;
use crate::types::{CandidateLead, LeadDetails, MobileNumber};

/// Source label used when the capture source does not name one.
pub const DEFAULT_SOURCE: &str = "OLX/FB";

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:91-?)?[6-9][0-9]{9}").expect("phone regex should compile")
});

static REG_NO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z]{2}[0-9]{2}[A-Z]{2}[0-9]{4}").expect("registration regex should compile")
});

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)[0-9]{2}\b").expect("year regex should compile"));

static KM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([0-9]+)\s*(?:km|k\.m)").expect("km regex should compile")
});

/// One page as seen by a capture source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePage {
    /// Visible page text.
    pub text: String,
    /// Listing title, used as the car model.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Defaults to [`DEFAULT_SOURCE`].
    #[serde(default)]
    pub source: Option<String>,
}

/// Numbers already emitted by this capture source.
///
/// Seed it from the sent-log so numbers delivered in earlier runs are not
/// captured again.
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    seen: HashSet<MobileNumber>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded_from(sent_log: &SentLog) -> Self {
        CaptureSession {
            seen: sent_log.snapshot().into_iter().collect(),
        }
    }

    pub fn has_seen(&self, mobile: &MobileNumber) -> bool {
        self.seen.contains(mobile)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Returns true if `mobile` had not been seen before.
    fn mark(&mut self, mobile: &MobileNumber) -> bool {
        self.seen.insert(mobile.clone())
    }
}

/// Replaces punctuation with spaces and trims.
fn clean_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Phone numbers on the page, canonical and in order of first appearance.
pub fn extract_phones(text: &str) -> Vec<MobileNumber> {
    let mut phones = Vec::new();
    for m in PHONE_REGEX.find_iter(text) {
        if let Ok(mobile) = MobileNumber::parse(m.as_str())
            && !phones.contains(&mobile)
        {
            phones.push(mobile);
        }
    }
    phones
}

/// Vehicle details shared by every lead on the page.
fn extract_details(page: &CapturePage) -> LeadDetails {
    let text = &page.text;
    let reg_no = REG_NO_REGEX
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let year = YEAR_REGEX
        .find_iter(text)
        .last()
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let km = KM_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut extra = serde_json::Map::new();
    extra.insert("isOwner".to_string(), Value::Bool(false));
    extra.insert("status".to_string(), Value::String("pending".to_string()));

    LeadDetails {
        reg_no,
        car_model: page.title.as_deref().map(clean_text).unwrap_or_default(),
        year,
        km,
        address: page.address.as_deref().map(clean_text).unwrap_or_default(),
        source: page
            .source
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        context: None,
        follow_up: None,
        timestamp: Some(Utc::now()),
        extra,
    }
}

/// Extracts one lead per phone number on the page not yet seen by `session`.
pub fn extract_leads(page: &CapturePage, session: &mut CaptureSession) -> Vec<CandidateLead> {
    let phones = extract_phones(&page.text);
    if phones.is_empty() {
        return Vec::new();
    }

    let details = extract_details(page);
    let leads: Vec<CandidateLead> = phones
        .into_iter()
        .filter(|mobile| session.mark(mobile))
        .map(|mobile| CandidateLead::new(mobile.as_str()).with_details(details.clone()))
        .collect();

    debug!(count = leads.len(), "Extracted leads from page");
    leads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use tempfile::tempdir;

    const LISTING: &str = "\
Maruti Swift VXI 2015 model, bought 2016
Reg MH12AB1234, driven 45000 km
Call 9812345678 or +91-7012345678, also 9812345678
Posted in Pune";

    fn page(text: &str) -> CapturePage {
        CapturePage {
            text: text.to_string(),
            title: Some("Maruti Swift VXI!".to_string()),
            address: Some("Kothrud, Pune".to_string()),
            source: None,
        }
    }

    #[test]
    fn phones_are_normalized_and_deduplicated() {
        let phones = extract_phones(LISTING);
        let phones: Vec<&str> = phones.iter().map(|m| m.as_str()).collect();
        assert_eq!(phones, ["9812345678", "7012345678"]);
    }

    #[test]
    fn numbers_outside_mobile_range_are_ignored() {
        assert!(extract_phones("landline 0201234567, id 1234567890").is_empty());
    }

    #[test]
    fn details_follow_first_reg_last_year_first_km() {
        let mut session = CaptureSession::new();
        let leads = extract_leads(&page(LISTING), &mut session);

        assert_eq!(leads.len(), 2);
        let d = &leads[0].details;
        assert_eq!(d.reg_no, "MH12AB1234");
        assert_eq!(d.year, "2016");
        assert_eq!(d.km, "45000");
        assert_eq!(d.car_model, "Maruti Swift VXI");
        assert_eq!(d.address, "Kothrud  Pune");
        assert_eq!(d.source, DEFAULT_SOURCE);
        assert!(d.timestamp.is_some());
        assert_eq!(d.extra.get("status"), Some(&Value::String("pending".into())));
    }

    #[test]
    fn km_is_case_insensitive_and_accepts_dotted_form() {
        let mut session = CaptureSession::new();
        let leads = extract_leads(&page("9812345678 ran 72000 K.M only"), &mut session);
        assert_eq!(leads[0].details.km, "72000");
    }

    #[test]
    fn missing_details_are_empty() {
        let mut session = CaptureSession::new();
        let leads = extract_leads(
            &CapturePage {
                text: "call 9812345678".into(),
                ..Default::default()
            },
            &mut session,
        );
        let d = &leads[0].details;
        assert_eq!((d.reg_no.as_str(), d.year.as_str(), d.km.as_str()), ("", "", ""));
        assert_eq!(d.car_model, "");
    }

    #[test]
    fn session_emits_each_number_once() {
        let mut session = CaptureSession::new();

        assert_eq!(extract_leads(&page(LISTING), &mut session).len(), 2);
        assert!(extract_leads(&page(LISTING), &mut session).is_empty());
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn page_without_phones_yields_nothing() {
        let mut session = CaptureSession::new();
        assert!(extract_leads(&page("no numbers here, MH12AB1234"), &mut session).is_empty());
        assert!(session.is_empty());
    }

    #[test]
    fn session_seeded_from_sent_log_skips_delivered_numbers() {
        let dir = tempdir().unwrap();
        let log = SentLog::open(dir.path(), EventBus::new()).unwrap();
        log.record(&MobileNumber::parse("9812345678").unwrap()).unwrap();

        let mut session = CaptureSession::seeded_from(&log);
        let leads = extract_leads(&page(LISTING), &mut session);

        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].mobile, "7012345678");
    }

    #[test]
    fn explicit_source_is_kept() {
        let mut session = CaptureSession::new();
        let mut p = page("9812345678");
        p.source = Some("Facebook Marketplace".into());
        assert_eq!(extract_leads(&p, &mut session)[0].details.source, "Facebook Marketplace");
    }
}
