// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Disk-backed overflow persistence.
//!
//! When the collector is down long enough for the in-memory buffer to
//! grow past its threshold, the whole buffer is serialized to one JSON
//! array file and memory is released. The file is read back (and deleted)
//! exactly once, at the next pipeline start.
//!
//! If a previous overflow file is still present when spilling again, its
//! entries are strictly older than the current buffer, so they are merged
//! in front of the new spill in a single rewritten file. A file that can
//! no longer be parsed is unrecoverable loss: the contents are logged
//! away and the pipeline moves on rather than retrying a faulty
//! serialization path forever.

use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::entry::LogEntry;
use crate::error::PersistError;

/// Owns the overflow file path. Only the pipeline worker touches it.
#[derive(Debug)]
pub struct OverflowStore {
    path: PathBuf,
}

impl OverflowStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        OverflowStore { path }
    }

    /// Writes `entries` to the overflow file, keeping any older entries
    /// from a not-yet-drained file in front of them. Returns the total
    /// count persisted.
    pub fn persist(&self, entries: Vec<LogEntry>) -> Result<usize, PersistError> {
        let mut all = self.read_existing();
        all.extend(entries);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&all)?;
        // Stage to a sibling file and rename into place so an interrupted
        // write cannot leave a truncated overflow file.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.path)?;
        Ok(all.len())
    }

    /// Reads the overflow file back and deletes it. Invoked once, at
    /// pipeline construction. A parse failure is accepted as loss of
    /// that file's contents; the file is removed either way so it cannot
    /// wedge every subsequent startup.
    #[must_use]
    pub fn load_and_clear(&self) -> Vec<LogEntry> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Vec::new(),
        };

        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove overflow file {}: {e}", self.path.display());
        }

        match serde_json::from_slice::<Vec<LogEntry>>(&bytes) {
            Ok(entries) => {
                info!("Recovered {} overflowed entries from disk", entries.len());
                entries
            }
            Err(e) => {
                error!(
                    "Overflow file {} is corrupt, its entries are lost: {e}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    fn read_existing(&self) -> Vec<LogEntry> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice::<Vec<LogEntry>>(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Existing overflow file {} is corrupt and will be overwritten: {e}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }
}
