//! Mobile number normalization.
//!
//! Phone numbers are the dedup key for leads, so every number that enters the
//! system is reduced to one canonical 10-digit form before it is compared,
//! logged, or persisted.
//!
//! # Accepted Inputs
//!
//! After stripping every non-digit character:
//! - exactly 10 digits, or
//! - exactly 12 digits beginning with the `91` country code.
//!
//! The canonical form is the last 10 digits, whose first digit must be in
//! `6..=9` (the mobile range for the target numbering plan).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a canonical mobile number.
pub const MOBILE_LEN: usize = 10;

/// Country code accepted as a prefix of a 12-digit number.
pub const COUNTRY_CODE: &str = "91";

/// Why a raw string could not be turned into a [`MobileNumber`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MobileError {
    /// The input contained no digits at all.
    #[error("no digits in {0:?}")]
    NoDigits(String),

    /// Digit count was neither 10 nor 12.
    #[error("expected 10 digits (or 12 with country code), got {len} in {raw:?}")]
    BadLength { raw: String, len: usize },

    /// 12 digits, but not starting with the accepted country code.
    #[error("unrecognized country code in {0:?}")]
    UnknownCountryCode(String),

    /// First digit of the local number is outside `6..=9`.
    #[error("{0:?} does not start with a mobile digit (6-9)")]
    NotMobile(String),
}

/// A canonical 10-digit mobile number.
///
/// The only way to build one is [`MobileNumber::parse`] (or deserializing,
/// which goes through `parse`), so holding a `MobileNumber` means the value is
/// normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MobileNumber(String);

impl MobileNumber {
    /// Normalizes a raw captured string.
    pub fn parse(raw: &str) -> Result<Self, MobileError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

        let local = match digits.len() {
            0 => return Err(MobileError::NoDigits(raw.to_string())),
            MOBILE_LEN => digits.as_str(),
            12 => digits
                .strip_prefix(COUNTRY_CODE)
                .ok_or_else(|| MobileError::UnknownCountryCode(raw.to_string()))?,
            len => {
                return Err(MobileError::BadLength {
                    raw: raw.to_string(),
                    len,
                });
            }
        };

        if !matches!(local.as_bytes().first(), Some(b'6'..=b'9')) {
            return Err(MobileError::NotMobile(raw.to_string()));
        }

        Ok(MobileNumber(local.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MobileNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MobileNumber {
    type Error = MobileError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        MobileNumber::parse(&s)
    }
}

impl From<MobileNumber> for String {
    fn from(m: MobileNumber) -> Self {
        m.0
    }
}

impl std::str::FromStr for MobileNumber {
    type Err = MobileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MobileNumber::parse(s)
    }
}
