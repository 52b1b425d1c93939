#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use cascade::ExecutionMode;
use cascade::config::{LinkConfig, ModuleConfig, PipelineConfig, RawPipelineConfig, SettingsSection};

/// Builder for `PipelineConfig` to simplify test setup.
pub struct PipelineConfigBuilder {
    config: RawPipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawPipelineConfig {
                settings: SettingsSection::default(),
                module: BTreeMap::new(),
                link: Vec::new(),
            },
        }
    }

    pub fn with_module(mut self, name: &str, module: ModuleConfig) -> Self {
        self.config.module.insert(name.to_string(), module);
        self
    }

    pub fn with_link(mut self, from: &str, from_key: &str, to: &str, to_key: &str) -> Self {
        self.config.link.push(LinkConfig {
            from: from.to_string(),
            from_key: from_key.to_string(),
            to: to.to_string(),
            to_key: to_key.to_string(),
        });
        self
    }

    pub fn execution(mut self, mode: ExecutionMode) -> Self {
        self.config.settings.execution = mode;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.settings.cache_dir = Some(dir.into());
        self
    }

    pub fn run_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.settings.run_log_dir = Some(dir.into());
        self
    }

    pub fn in_memory_cache(mut self) -> Self {
        self.config.settings.persist_cache = false;
        self
    }

    /// The raw config, for tests that exercise validation failures.
    pub fn build_raw(self) -> RawPipelineConfig {
        self.config
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ModuleConfig`.
pub struct ModuleConfigBuilder {
    module: ModuleConfig,
}

impl ModuleConfigBuilder {
    pub fn new(module_type: &str) -> Self {
        Self {
            module: ModuleConfig {
                module_type: module_type.to_string(),
                after: vec![],
                params: toml::Table::new(),
                params_file: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.module.after.push(dep.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.module.params.insert(key.to_string(), value.into());
        self
    }

    pub fn params_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.module.params_file = Some(path.into());
        self
    }

    pub fn build(self) -> ModuleConfig {
        self.module
    }
}
