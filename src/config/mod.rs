// src/config/mod.rs

//! Configuration loading and validation for cascade.
//!
//! Responsibilities:
//! - Define the TOML-backed pipeline model (`model.rs`).
//! - Load a pipeline file from disk (`loader.rs`).
//! - Validate dependencies, cycles and links (`validate.rs`).
//! - Resolve controller settings from file, environment and defaults
//!   (`settings.rs`).
//! - Register modules and build the DAG from a config (`pipeline.rs`).

pub mod loader;
pub mod model;
pub mod pipeline;
pub mod settings;
pub mod validate;

pub use loader::{config_base_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{LinkConfig, ModuleConfig, PipelineConfig, RawPipelineConfig, SettingsSection};
pub use pipeline::build_pipeline;
pub use settings::{CACHE_DIR_ENV, ControllerSettings, resolve_cache_dir};
