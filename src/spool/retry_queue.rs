//! Durable FIFO of leads whose delivery failed.
//!
//! A lead enters the queue only after a failed delivery attempt and leaves it
//! only through [`RetryQueue::dequeue_front`]. The queue does not suppress
//! duplicates; the same number may be queued more than once if separate
//! captures of it fail.
//!
//! Like the sent-log, every mutation rewrites the full snapshot under the
//! queue's lock and rolls the in-memory change back if the write fails, so two
//! concurrent enqueues can never lose one another.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use crate::persistence::snapshot::{SnapshotError, save_snapshot_atomic, try_load_snapshot};
use crate::types::Lead;

/// File name of the retry queue inside the state directory.
pub const RETRY_QUEUE_FILE: &str = "retry_queue.json";

/// Errors from retry queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("retry queue persistence failed: {0}")]
    Persistence(#[from] SnapshotError),
}

/// Result type for retry queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Durable FIFO of leads awaiting redelivery.
#[derive(Debug)]
pub struct RetryQueue {
    path: PathBuf,
    leads: Mutex<VecDeque<Lead>>,
}

impl RetryQueue {
    /// Opens the queue in `state_dir`, loading any existing snapshot.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(RETRY_QUEUE_FILE);
        let leads: VecDeque<Lead> = try_load_snapshot(&path)?.unwrap_or_default();
        debug!(path = %path.display(), pending = leads.len(), "Loaded retry queue");

        Ok(RetryQueue {
            path,
            leads: Mutex::new(leads),
        })
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Lead>> {
        self.leads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `lead` to the tail and persists the queue.
    ///
    /// # Errors
    ///
    /// On a write failure the lead is NOT queued, in memory or on disk; the
    /// caller must treat it as not durably stored.
    pub fn enqueue(&self, lead: Lead) -> Result<()> {
        let mut leads = self.lock();
        let mobile = lead.mobile.clone();
        leads.push_back(lead);

        if let Err(e) = save_snapshot_atomic(&self.path, &*leads) {
            leads.pop_back();
            return Err(e.into());
        }

        info!(mobile = %mobile, pending = leads.len(), "Lead enqueued for retry");
        Ok(())
    }

    /// Removes and returns the head of the queue, persisting the shorter queue.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    ///
    /// # Errors
    ///
    /// On a write failure the head is put back and the error returned, so the
    /// lead stays queued.
    pub fn dequeue_front(&self) -> Result<Option<Lead>> {
        let mut leads = self.lock();
        let Some(lead) = leads.pop_front() else {
            return Ok(None);
        };

        if let Err(e) = save_snapshot_atomic(&self.path, &*leads) {
            leads.push_front(lead);
            return Err(e.into());
        }

        debug!(mobile = %lead.mobile, remaining = leads.len(), "Dequeued lead");
        Ok(Some(lead))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queued leads, head first.
    pub fn snapshot(&self) -> Vec<Lead> {
        self.lock().iter().cloned().collect()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
