//! Lead Relay - captures contact leads from classified-ad pages, deduplicates
//! them against a persistent sent-log, and delivers each one to a webhook,
//! queueing failed deliveries for a single retry.
//!
//! This library provides the pipeline and its durable state; the binary wraps
//! it in an HTTP control server.

pub mod capture;
pub mod config;
pub mod delivery;
pub mod events;
pub mod persistence;
pub mod relay;
pub mod server;
pub mod spool;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use relay::LeadRelay;
