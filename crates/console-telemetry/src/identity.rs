// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Device and session identity.
//!
//! The device identifier is generated once per installation and then kept
//! forever (set-if-absent). The session identifier is generated at first
//! use, survives restarts, and changes only when the host application
//! explicitly rotates it. Both are opaque UUID v4 tokens; nothing in the
//! pipeline reads structure out of them.

use std::sync::{Arc, Mutex};

use tracing::warn;
use uuid::Uuid;

use crate::keystore::KeyStore;

const DEVICE_ID_KEY: &str = "telemetry.device_id";
const SESSION_ID_KEY: &str = "telemetry.session_id";

/// Owns the persisted device and session identifiers.
///
/// Store write failures are absorbed: the in-memory identifier is still
/// used for the rest of the run, it just will not survive a restart.
pub struct IdentityManager {
    store: Arc<dyn KeyStore>,
    device_id: String,
    session_id: Mutex<String>,
}

impl IdentityManager {
    /// Loads (or generates and persists) both identifiers.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        let device_id = Self::get_or_create(&*store, DEVICE_ID_KEY);
        let session_id = Self::get_or_create(&*store, SESSION_ID_KEY);
        IdentityManager {
            store,
            device_id,
            session_id: Mutex::new(session_id),
        }
    }

    fn get_or_create(store: &dyn KeyStore, key: &str) -> String {
        if let Some(existing) = store.get(key) {
            return existing;
        }
        let fresh = Uuid::new_v4().to_string();
        if let Err(e) = store.put(key, &fresh) {
            warn!("Failed to persist {key}, identifier will not survive restart: {e}");
        }
        fresh
    }

    /// Stable per-installation device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current session identifier.
    #[must_use]
    pub fn session_id(&self) -> String {
        #[allow(clippy::expect_used)]
        self.session_id.lock().expect("lock poisoned").clone()
    }

    /// Generates, persists, and installs a fresh session identifier.
    ///
    /// Returns `(previous, new)` so the caller can emit the rotation
    /// marker entry.
    pub fn start_new_session(&self) -> (String, String) {
        let fresh = Uuid::new_v4().to_string();
        // Persist under the lock so concurrent rotations cannot store
        // one identifier while installing another.
        #[allow(clippy::expect_used)]
        let mut current = self.session_id.lock().expect("lock poisoned");
        if let Err(e) = self.store.put(SESSION_ID_KEY, &fresh) {
            warn!("Failed to persist rotated session id: {e}");
        }
        let previous = std::mem::replace(&mut *current, fresh.clone());
        (previous, fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::MemoryKeyStore;

    #[test]
    fn device_id_is_stable_across_managers() {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let first = IdentityManager::new(Arc::clone(&store));
        let device_id = first.device_id().to_string();
        drop(first);

        let second = IdentityManager::new(store);
        assert_eq!(second.device_id(), device_id);
    }

    #[test]
    fn session_id_is_stable_until_rotated() {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let manager = IdentityManager::new(Arc::clone(&store));
        let session = manager.session_id();
        assert_eq!(manager.session_id(), session);

        let reopened = IdentityManager::new(store);
        assert_eq!(reopened.session_id(), session);
    }

    #[test]
    fn rotation_generates_and_persists_a_fresh_id() {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let manager = IdentityManager::new(Arc::clone(&store));
        let before = manager.session_id();

        let (previous, fresh) = manager.start_new_session();
        assert_eq!(previous, before);
        assert_ne!(fresh, before);
        assert_eq!(manager.session_id(), fresh);

        // The rotated id is what a restart picks up.
        let reopened = IdentityManager::new(store);
        assert_eq!(reopened.session_id(), fresh);
    }

    #[test]
    fn concurrent_rotations_persist_the_installed_id() {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let manager = Arc::new(IdentityManager::new(Arc::clone(&store)));

        let rotations: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.start_new_session())
            })
            .collect();
        for rotation in rotations {
            rotation.join().unwrap();
        }

        // Whichever rotation won last, the stored id is the one in use.
        assert_eq!(store.get(SESSION_ID_KEY), Some(manager.session_id()));
    }

    #[test]
    fn identifiers_are_unique_per_installation() {
        let a = IdentityManager::new(Arc::new(MemoryKeyStore::new()));
        let b = IdentityManager::new(Arc::new(MemoryKeyStore::new()));
        assert_ne!(a.device_id(), b.device_id());
    }
}
