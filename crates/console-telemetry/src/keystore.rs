// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Minimal key-value collaborator used to persist identity.
//!
//! The pipeline stores exactly two values durably outside the overflow
//! file: the per-installation device identifier and the current session
//! identifier. [`KeyStore`] is the boundary toward whatever the platform
//! provides (keychain, shared preferences, plain file). The crate ships a
//! file-backed implementation and an in-memory one for tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::error::PersistError;

/// Synchronized string key-value store.
///
/// Reads and writes are expected to be rare (once per process start plus
/// explicit session rotations), so implementations may block briefly.
pub trait KeyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str) -> Result<(), PersistError>;
}

/// `KeyStore` backed by a single JSON object file in the app's durable
/// storage area.
pub struct FileKeyStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileKeyStore {
    /// Opens the store, loading whatever the file currently holds. A
    /// missing or unreadable file starts the store empty.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Key store file {} is corrupt, starting empty: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        FileKeyStore {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn write_out(&self, entries: &HashMap<String, String>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(entries)?;
        // Stage to a sibling file and rename into place so an interrupted
        // write cannot corrupt the identity file.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self, key: &str) -> Option<String> {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("lock poisoned");
        entries.get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistError> {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.write_out(&entries)
    }
}

/// In-memory `KeyStore` for tests and throwaway runs. Nothing survives
/// the process.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &str) -> Option<String> {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("lock poisoned");
        entries.get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistError> {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
