// src/cache/store.rs

//! Backends that persist the fingerprint set.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::errors::{CascadeError, Result};

/// File name of the persisted fingerprint list inside the cache directory.
pub const CACHE_FILE_NAME: &str = "fingerprints.json";

/// Abstract storage for the fingerprint set.
pub trait FingerprintStore: Send + Sync + Debug {
    /// Read every persisted fingerprint. A missing store is an empty list.
    fn load(&self) -> Result<Vec<String>>;

    /// Overwrite the store with `fingerprints`.
    fn save(&self, fingerprints: &[String]) -> Result<()>;

    /// Human-readable location for diagnostics.
    fn location(&self) -> String;
}

/// Stores fingerprints as a JSON array of hex strings in a single file.
#[derive(Debug, Clone)]
pub struct FileFingerprintStore {
    path: PathBuf,
}

impl FileFingerprintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/fingerprints.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "no fingerprint store on disk yet");
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str::<Vec<String>>(&contents).map_err(|e| {
            CascadeError::Persistence(format!(
                "malformed fingerprint store at {:?}: {e}",
                self.path
            ))
        })
    }

    fn save(&self, fingerprints: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(fingerprints)?;

        // Write next to the target and rename so a crash never leaves a
        // truncated store behind.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps the "persisted" list in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    saved: Mutex<Vec<String>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing list, as if it had been persisted earlier.
    pub fn with_fingerprints(fingerprints: Vec<String>) -> Self {
        Self {
            saved: Mutex::new(fingerprints),
        }
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn load(&self) -> Result<Vec<String>> {
        let saved = self.saved.lock().map_err(crate::errors::lock_error)?;
        Ok(saved.clone())
    }

    fn save(&self, fingerprints: &[String]) -> Result<()> {
        let mut saved = self.saved.lock().map_err(crate::errors::lock_error)?;
        *saved = fingerprints.to_vec();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
