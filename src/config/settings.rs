// src/config/settings.rs

//! Controller settings resolved from the pipeline file, the environment and
//! built-in defaults (in that order).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::cache::DedupCache;
use crate::config::model::SettingsSection;
use crate::controller::{ControllerBuilder, ExecutionController};
use crate::runlog::resolve_run_log_dir;
use crate::types::ExecutionMode;

/// Environment override for the fingerprint store directory.
pub const CACHE_DIR_ENV: &str = "CASCADE_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Directory holding `fingerprints.json`.
    pub cache_dir: PathBuf,
    pub run_log_dir: PathBuf,
    pub execution: ExecutionMode,
    pub persist_cache: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ControllerSettings {
    /// Settings from the environment and defaults only.
    pub fn from_env() -> Self {
        Self::from_section(&SettingsSection::default())
    }

    /// Settings from a `[settings]` section, filling gaps from the
    /// environment and defaults.
    pub fn from_section(section: &SettingsSection) -> Self {
        let settings = Self {
            cache_dir: resolve_cache_dir(section.cache_dir.as_deref()),
            run_log_dir: resolve_run_log_dir(section.run_log_dir.as_deref()),
            execution: section.execution,
            persist_cache: section.persist_cache,
        };
        debug!(?settings, "controller settings resolved");
        settings
    }

    pub fn dedup_cache(&self) -> DedupCache {
        if self.persist_cache {
            DedupCache::persistent(&self.cache_dir)
        } else {
            DedupCache::in_memory()
        }
    }

    /// Builder pre-configured with this cache and run-log directory.
    pub fn controller_builder(&self) -> ControllerBuilder {
        ExecutionController::builder()
            .cache(Arc::new(self.dedup_cache()))
            .run_log_dir(self.run_log_dir.clone())
    }
}

/// `dir`, else `$CASCADE_CACHE_DIR`, else `<user cache dir>/cascade`.
pub fn resolve_cache_dir(dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = dir {
        return dir.to_path_buf();
    }
    if let Some(env_dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(env_dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cascade")
}
