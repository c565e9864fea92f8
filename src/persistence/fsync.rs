//! fsync helpers used by snapshot writes.
//!
//! Syncing the file makes its bytes durable; syncing the parent directory
//! makes the rename that published it durable. A snapshot write needs both,
//! otherwise a power loss can bring back the previous sent-log or queue.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Flushes a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Flushes a directory's entries to disk.
///
/// Only pass directory paths. Fails if the path does not exist.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
