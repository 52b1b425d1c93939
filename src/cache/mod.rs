// src/cache/mod.rs

//! Content-addressable duplicate-run cache.
//!
//! One [`DedupCache`] is built per process and shared (behind an `Arc`) by
//! every Local module run. It is a grow-only set of fingerprints that is
//! loaded lazily from a [`FingerprintStore`] on first use and written back in
//! full whenever a fingerprint is recorded.

pub mod store;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

pub use store::{CACHE_FILE_NAME, FileFingerprintStore, FingerprintStore, MemoryFingerprintStore};

#[derive(Debug, Default)]
struct CacheState {
    loaded: bool,
    fingerprints: BTreeSet<String>,
}

/// Process-wide set of fingerprints for work that already completed.
#[derive(Debug)]
pub struct DedupCache {
    store: Box<dyn FingerprintStore>,
    state: Mutex<CacheState>,
}

impl DedupCache {
    pub fn new(store: Box<dyn FingerprintStore>) -> Self {
        Self {
            store,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cache persisted to `<dir>/fingerprints.json`.
    pub fn persistent(dir: impl AsRef<Path>) -> Self {
        Self::new(Box::new(FileFingerprintStore::in_dir(dir)))
    }

    /// Cache that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryFingerprintStore::new()))
    }

    /// Where the cache is persisted (for diagnostics).
    pub fn location(&self) -> String {
        self.store.location()
    }

    // The set only ever grows, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_loaded(&self, state: &mut CacheState) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        match self.store.load() {
            Ok(fingerprints) => {
                let count = fingerprints.len();
                state.fingerprints.extend(fingerprints);
                debug!(count, location = %self.store.location(), "loaded dedup cache");
            }
            Err(e) => {
                warn!(
                    location = %self.store.location(),
                    error = %e,
                    "could not read dedup cache; starting empty"
                );
            }
        }
    }

    fn persist(&self, state: &CacheState) {
        let all: Vec<String> = state.fingerprints.iter().cloned().collect();
        match self.store.save(&all) {
            Ok(()) => debug!(count = all.len(), "saved dedup cache"),
            Err(e) => warn!(
                location = %self.store.location(),
                error = %e,
                "could not save dedup cache; continuing with in-memory state"
            ),
        }
    }

    /// Read the persisted set. Idempotent; a missing or corrupt store leaves
    /// the cache empty and is never an error.
    pub fn load(&self) {
        let mut state = self.lock();
        self.ensure_loaded(&mut state);
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        let mut state = self.lock();
        self.ensure_loaded(&mut state);
        state.fingerprints.contains(fingerprint)
    }

    /// Add a fingerprint in memory without persisting.
    pub fn add(&self, fingerprint: &str) {
        let mut state = self.lock();
        self.ensure_loaded(&mut state);
        state.fingerprints.insert(fingerprint.to_string());
    }

    /// Write the full set back to the store. Failures are logged only.
    pub fn save(&self) {
        let mut state = self.lock();
        self.ensure_loaded(&mut state);
        self.persist(&state);
    }

    /// Add and persist as one unit, so concurrent recorders never lose an
    /// update.
    pub fn record(&self, fingerprint: &str) {
        let mut state = self.lock();
        self.ensure_loaded(&mut state);
        if state.fingerprints.insert(fingerprint.to_string()) {
            info!(fingerprint, "recorded completed run in dedup cache");
        }
        self.persist(&state);
    }

    pub fn len(&self) -> usize {
        let mut state = self.lock();
        self.ensure_loaded(&mut state);
        state.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
