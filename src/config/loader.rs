// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PipelineConfig, RawPipelineConfig};
use crate::errors::{CascadeError, Result};

/// Load a pipeline file and return the raw, unvalidated config.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for
/// the dependency, cycle and link checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        CascadeError::Config(format!("reading config file at {}: {e}", path.display()))
    })?;

    let config: RawPipelineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a pipeline file and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let raw_config = load_from_path(&path)?;
    let config = PipelineConfig::try_from(raw_config)?;
    Ok(config)
}

/// `Cascade.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Cascade.toml")
}

/// Directory relative paths in a config file are resolved against.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_path("/definitely/not/here/Cascade.toml").unwrap_err();
        assert!(matches!(err, CascadeError::Config(ref m) if m.contains("Cascade.toml")));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cascade.toml");
        fs::write(&path, "[module.a\ntype = ").unwrap();
        assert!(matches!(load_from_path(&path), Err(CascadeError::Toml(_))));
    }

    #[test]
    fn base_dir_of_bare_file_name_is_cwd() {
        assert_eq!(config_base_dir(Path::new("Cascade.toml")), PathBuf::from("."));
        assert_eq!(
            config_base_dir(Path::new("pipelines/Cascade.toml")),
            PathBuf::from("pipelines")
        );
    }
}
