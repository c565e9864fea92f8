//! Persistent log of numbers already delivered.
//!
//! The sent-log is the dedup authority: a number present here has been
//! accepted by the endpoint and must not be sent again. It is append-only and
//! never pruned.
//!
//! # Consistency
//!
//! The in-memory set is authoritative once loaded. [`SentLog::record`] holds
//! the lock across the whole read-modify-write: it appends, writes the full
//! snapshot atomically, and only then releases the lock. If the write fails the
//! append is undone, so memory never claims a number the disk does not have.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use crate::events::EventBus;
use crate::persistence::snapshot::{SnapshotError, save_snapshot_atomic, try_load_snapshot};
use crate::types::MobileNumber;

/// File name of the sent-log inside the state directory.
pub const SENT_LOG_FILE: &str = "sent_log.json";

/// Errors from sent-log operations.
#[derive(Debug, Error)]
pub enum SentLogError {
    #[error("sent-log persistence failed: {0}")]
    Persistence(#[from] SnapshotError),
}

/// Result type for sent-log operations.
pub type Result<T> = std::result::Result<T, SentLogError>;

#[derive(Debug, Default)]
struct Entries {
    /// Recording order, as persisted.
    ordered: Vec<MobileNumber>,
    index: HashSet<MobileNumber>,
}

impl Entries {
    fn from_ordered(numbers: Vec<MobileNumber>) -> Self {
        let mut entries = Entries::default();
        for number in numbers {
            if entries.index.insert(number.clone()) {
                entries.ordered.push(number);
            }
        }
        entries
    }
}

/// Durable set of delivered mobile numbers.
#[derive(Debug)]
pub struct SentLog {
    path: PathBuf,
    entries: Mutex<Entries>,
    events: EventBus,
}

impl SentLog {
    /// Opens the sent-log in `state_dir`, loading any existing snapshot.
    ///
    /// A missing file is an empty log. Duplicate numbers in a hand-edited file
    /// are collapsed.
    pub fn open(state_dir: &Path, events: EventBus) -> Result<Self> {
        let path = state_dir.join(SENT_LOG_FILE);
        let numbers: Vec<MobileNumber> = try_load_snapshot(&path)?.unwrap_or_default();
        debug!(path = %path.display(), count = numbers.len(), "Loaded sent-log");

        Ok(SentLog {
            path,
            entries: Mutex::new(Entries::from_ordered(numbers)),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if `mobile` was previously recorded as delivered.
    pub fn contains(&self, mobile: &MobileNumber) -> bool {
        self.lock().index.contains(mobile)
    }

    /// Records `mobile` as delivered.
    ///
    /// Returns `Ok(true)` if the number was newly recorded (and an
    /// acknowledgment was published), `Ok(false)` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be written. The log is left
    /// exactly as it was before the call, in memory and on disk.
    pub fn record(&self, mobile: &MobileNumber) -> Result<bool> {
        let mut entries = self.lock();
        if entries.index.contains(mobile) {
            debug!(mobile = %mobile, "Already in sent-log");
            return Ok(false);
        }

        entries.ordered.push(mobile.clone());
        if let Err(e) = save_snapshot_atomic(&self.path, &entries.ordered) {
            entries.ordered.pop();
            return Err(e.into());
        }
        entries.index.insert(mobile.clone());
        drop(entries);

        info!(mobile = %mobile, "Logged as sent in persistent log");
        self.events.acknowledge(mobile);
        Ok(true)
    }

    /// Number of recorded numbers.
    pub fn len(&self) -> usize {
        self.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All recorded numbers, in recording order.
    pub fn snapshot(&self) -> Vec<MobileNumber> {
        self.lock().ordered.clone()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
