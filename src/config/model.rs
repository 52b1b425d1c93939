// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::Result;
use crate::module::Parameters;
use crate::types::ExecutionMode;

/// Pipeline configuration as read from a TOML file, before validation.
///
/// ```toml
/// [settings]
/// execution = "parallel"
///
/// [module.total]
/// type = "sum"
/// params = { a = 1, b = 2 }
///
/// [module.check]
/// type = "dag_debug"
/// after = ["total"]
/// params_file = "check.yaml"
///
/// [[link]]
/// from = "total"
/// from_key = "a"
/// to = "check"
/// to_key = "input"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPipelineConfig {
    #[serde(default)]
    pub settings: SettingsSection,

    /// Module instances keyed by their registered name.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleConfig>,

    /// Parameter links from `[[link]]` tables.
    #[serde(default)]
    pub link: Vec<LinkConfig>,
}

/// Validated pipeline configuration. Build one with `TryFrom<RawPipelineConfig>`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub settings: SettingsSection,
    pub module: BTreeMap<String, ModuleConfig>,
    pub link: Vec<LinkConfig>,
}

impl PipelineConfig {
    pub(crate) fn new_unchecked(
        settings: SettingsSection,
        module: BTreeMap<String, ModuleConfig>,
        link: Vec<LinkConfig>,
    ) -> Self {
        Self {
            settings,
            module,
            link,
        }
    }
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    /// `"sequential"` (default) or `"parallel"`.
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Directory holding the fingerprint store.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Directory for run logs.
    #[serde(default)]
    pub run_log_dir: Option<PathBuf>,

    /// When false, the dedup cache lives in memory only.
    #[serde(default = "default_persist_cache")]
    pub persist_cache: bool,
}

fn default_persist_cache() -> bool {
    true
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::default(),
            cache_dir: None,
            run_log_dir: None,
            persist_cache: default_persist_cache(),
        }
    }
}

/// `[module.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Catalog type to instantiate.
    #[serde(rename = "type")]
    pub module_type: String,

    /// Modules that must finish before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Inline parameters; these win over `params_file`.
    #[serde(default)]
    pub params: toml::Table,

    /// Parameter file (`.toml`, `.yaml`/`.yml` or `.json`), relative to the
    /// config file.
    #[serde(default)]
    pub params_file: Option<PathBuf>,
}

impl ModuleConfig {
    /// Effective parameters: `params_file` first, inline `params` on top.
    pub fn parameters(&self, base_dir: &Path) -> Result<Parameters> {
        let mut params = match &self.params_file {
            Some(file) => Parameters::load_file(base_dir.join(file))?,
            None => Parameters::new(),
        };
        let inline = Parameters::from_value(serde_json::to_value(&self.params)?)?;
        params.merge(inline);
        Ok(params)
    }
}

/// `[[link]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LinkConfig {
    pub from: String,
    pub from_key: String,
    pub to: String,
    pub to_key: String,
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn sections_have_defaults() {
        let raw: RawPipelineConfig = toml::from_str(
            r#"
            [module.a]
            type = "sum"
            "#,
        )
        .unwrap();

        assert_eq!(raw.settings.execution, ExecutionMode::Sequential);
        assert!(raw.settings.persist_cache);
        assert!(raw.link.is_empty());
        assert!(raw.module["a"].after.is_empty());
    }

    #[test]
    fn inline_params_override_file_params() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p.json"), r#"{"a": 1, "b": 2}"#).unwrap();

        let raw: RawPipelineConfig = toml::from_str(
            r#"
            [module.a]
            type = "sum"
            params_file = "p.json"
            params = { b = 20 }
            "#,
        )
        .unwrap();

        let params = raw.module["a"].parameters(dir.path()).unwrap();
        assert_eq!(params.get_i64("a"), Some(1));
        assert_eq!(params.get_i64("b"), Some(20));
    }
}
