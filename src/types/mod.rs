//! Core domain types for the lead relay.
//!
//! Invariants are pushed into the types: a [`MobileNumber`] is always in
//! canonical form, and a [`Lead`] always carries one.

pub mod lead;
pub mod mobile;

pub use lead::{CandidateLead, Lead, LeadDetails};
pub use mobile::{MobileError, MobileNumber};
