//! Whole-record snapshots.
//!
//! Every durable record (sent-log, retry queue, settings) is stored as one JSON
//! document and rewritten in full on each mutation. Documents are wrapped in a
//! versioned envelope:
//!
//! ```text
//! { "schemaVersion": 1, "updatedAt": "2026-01-01T00:00:00Z", "data": ... }
//! ```
//!
//! # Atomic Writes
//!
//! Snapshots are written using the write-to-temp-then-rename pattern:
//! 1. Write to `<name>.json.tmp`
//! 2. fsync the file
//! 3. Rename to `<name>.json`
//! 4. fsync the directory
//!
//! Readers therefore see either the previous snapshot or the new one. A crash
//! or I/O error before the rename leaves the previous snapshot in place. Once
//! the rename succeeds the write is reported as done; a failed directory fsync
//! is only logged.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::fsync::{fsync_dir, fsync_file};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error during file operations.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Schema version mismatch.
    #[error("schema version mismatch in {path}: expected {expected}, got {got}")]
    SchemaMismatch {
        path: PathBuf,
        expected: u32,
        got: u32,
    },
}

impl SnapshotError {
    fn io(path: &Path, source: io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Versioned envelope around a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this snapshot was written.
    pub updated_at: DateTime<Utc>,

    pub data: T,
}

impl<T> Snapshot<T> {
    /// Wraps `data` with the current schema version and timestamp.
    pub fn new(data: T) -> Self {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            updated_at: Utc::now(),
            data,
        }
    }
}

/// Returns the temp path used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Saves `data` atomically to `path`, wrapped in a fresh [`Snapshot`].
///
/// # Errors
///
/// Returns an error if serialization or any IO operation up to and including
/// the rename fails. On error the file at `path` is untouched. A failed
/// directory fsync after the rename is logged and not reported: the new
/// snapshot is already in place.
pub fn save_snapshot_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    save_with_dir_sync(path, data, fsync_dir)
}

fn save_with_dir_sync<T, F>(path: &Path, data: &T, sync_dir: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&Path) -> io::Result<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
    }

    let bytes =
        serde_json::to_vec_pretty(&Snapshot::new(data)).map_err(|e| SnapshotError::json(path, e))?;

    let tmp_path = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| SnapshotError::io(&tmp_path, e))?;
        file.write_all(&bytes)
            .map_err(|e| SnapshotError::io(&tmp_path, e))?;
        fsync_file(&file).map_err(|e| SnapshotError::io(&tmp_path, e))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(SnapshotError::io(path, e));
    }

    if let Some(parent) = path.parent()
        && let Err(e) = sync_dir(parent)
    {
        warn!(
            path = %path.display(),
            error = %e,
            "Snapshot renamed but directory fsync failed"
        );
    }

    Ok(())
}

/// Loads a snapshot from disk.
///
/// # Errors
///
/// Returns an error if:
/// - The file doesn't exist or can't be read
/// - The JSON is malformed
/// - The schema version is incompatible
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Snapshot<T>> {
    let bytes = std::fs::read(path).map_err(|e| SnapshotError::io(path, e))?;
    let snapshot: Snapshot<T> =
        serde_json::from_slice(&bytes).map_err(|e| SnapshotError::json(path, e))?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            path: path.to_path_buf(),
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Attempts to load a snapshot's data, returning None if the file doesn't exist.
///
/// Other errors (malformed JSON, schema mismatch) are propagated. A leftover
/// `.json.tmp` from an interrupted write is ignored.
pub fn try_load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot.data)),
        Err(SnapshotError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
