//! Lead records.
//!
//! A [`CandidateLead`] is what a capture source hands us: the raw phone string
//! plus whatever vehicle metadata it could scrape. Once its number normalizes
//! it becomes a [`Lead`], which is what the pipeline delivers and what the
//! retry queue persists.
//!
//! Field names on the wire are camelCase (`regNo`, `carModel`, `followUp`), and
//! metadata keys we don't model explicitly are carried through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::mobile::{MobileError, MobileNumber};

/// Free-form metadata attached to a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetails {
    /// Vehicle registration number.
    #[serde(default)]
    pub reg_no: String,

    /// Listing title, usually make and model.
    #[serde(default)]
    pub car_model: String,

    #[serde(default)]
    pub year: String,

    /// Odometer reading, digits only.
    #[serde(default)]
    pub km: String,

    #[serde(default)]
    pub address: String,

    /// Where the lead was captured (e.g. `OLX/FB`).
    #[serde(default)]
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,

    /// When the capture source saw the lead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Any other keys the capture source supplied.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A lead as submitted, before its mobile number is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLead {
    pub mobile: String,

    #[serde(flatten)]
    pub details: LeadDetails,
}

impl CandidateLead {
    pub fn new(mobile: impl Into<String>) -> Self {
        CandidateLead {
            mobile: mobile.into(),
            details: LeadDetails::default(),
        }
    }

    pub fn with_details(mut self, details: LeadDetails) -> Self {
        self.details = details;
        self
    }

    /// Normalizes the mobile number, producing a deliverable [`Lead`].
    pub fn normalize(self) -> Result<Lead, MobileError> {
        let mobile = MobileNumber::parse(&self.mobile)?;
        Ok(Lead {
            mobile,
            details: self.details,
        })
    }
}

/// A lead with a canonical mobile number.
///
/// Leads are never mutated after construction; the delivery payload is built
/// alongside the lead rather than by editing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub mobile: MobileNumber,

    #[serde(flatten)]
    pub details: LeadDetails,
}

impl Lead {
    pub fn new(mobile: MobileNumber, details: LeadDetails) -> Self {
        Lead { mobile, details }
    }

    /// Short human description used in acknowledgments and logs.
    pub fn summary(&self) -> String {
        let source = if self.details.source.is_empty() {
            "N/A"
        } else {
            &self.details.source
        };
        let context = self.details.context.as_deref().unwrap_or("N/A");
        format!("Source: {source} | Context: {context}")
    }
}
