//! Persistence layer for the lead relay.
//!
//! All durable state is a handful of small JSON records, each rewritten as a
//! whole snapshot on every mutation.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   sent_log.json     # numbers already delivered
//!   retry_queue.json  # leads awaiting redelivery (FIFO)
//!   settings.json     # webhook URL and license key
//! ```
//!
//! # Crash Safety
//!
//! - Snapshots are written atomically using write-to-temp-then-rename
//! - Both the file and its directory are fsynced before a write returns
//! - Leftover `.json.tmp` files from an interrupted write are ignored on load
//!
//! Serializing writers is the caller's job: each record has exactly one owner
//! (see [`crate::spool`] and [`crate::config::settings`]) that holds a lock
//! across its read-modify-write cycle.

pub mod fsync;
pub mod snapshot;

pub use fsync::{fsync_dir, fsync_file};
pub use snapshot::{
    SCHEMA_VERSION, Snapshot, SnapshotError, load_snapshot, save_snapshot_atomic,
    try_load_snapshot,
};
