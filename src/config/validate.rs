// src/config/validate.rs

use crate::config::model::{PipelineConfig, RawPipelineConfig};
use crate::dag::DagGraph;
use crate::errors::{CascadeError, Result};

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = CascadeError;

    fn try_from(raw: RawPipelineConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(PipelineConfig::new_unchecked(raw.settings, raw.module, raw.link))
    }
}

fn validate_raw_config(cfg: &RawPipelineConfig) -> Result<()> {
    ensure_has_modules(cfg)?;
    validate_module_types(cfg)?;
    validate_dag(cfg)?;
    validate_links(cfg)?;
    Ok(())
}

fn ensure_has_modules(cfg: &RawPipelineConfig) -> Result<()> {
    if cfg.module.is_empty() {
        return Err(CascadeError::Config(
            "config must contain at least one [module.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_module_types(cfg: &RawPipelineConfig) -> Result<()> {
    for (name, module) in &cfg.module {
        if module.module_type.trim().is_empty() {
            return Err(CascadeError::Config(format!(
                "module '{name}' has an empty `type`"
            )));
        }
    }
    Ok(())
}

/// Same checks the scheduler runs: unknown or self dependencies and cycles.
fn validate_dag(cfg: &RawPipelineConfig) -> Result<()> {
    let graph = DagGraph::from_nodes(
        cfg.module
            .iter()
            .map(|(name, m)| (name.as_str(), m.after.iter().map(String::as_str))),
    );
    graph.validate()?;
    Ok(())
}

fn validate_links(cfg: &RawPipelineConfig) -> Result<()> {
    for link in &cfg.link {
        for end in [&link.from, &link.to] {
            if !cfg.module.contains_key(end) {
                return Err(CascadeError::Config(format!(
                    "[[link]] {}.{} -> {}.{} references unknown module '{end}'",
                    link.from, link.from_key, link.to, link.to_key
                )));
            }
        }
        if link.from == link.to {
            return Err(CascadeError::Config(format!(
                "[[link]] cannot connect module '{}' to itself",
                link.from
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<PipelineConfig> {
        let raw: RawPipelineConfig = toml::from_str(text)?;
        PipelineConfig::try_from(raw)
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(matches!(parse(""), Err(CascadeError::Config(_))));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = parse(
            r#"
            [module.a]
            type = "sum"
            after = ["ghost"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let err = parse(
            r#"
            [module.a]
            type = "sum"
            after = ["b"]

            [module.b]
            type = "sum"
            after = ["a"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::CycleDetected(_)));
    }

    #[test]
    fn link_to_unknown_module_is_rejected() {
        let err = parse(
            r#"
            [module.a]
            type = "sum"

            [[link]]
            from = "a"
            from_key = "a"
            to = "missing"
            to_key = "b"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::Config(ref m) if m.contains("missing")));
    }

    #[test]
    fn valid_config_passes() {
        let cfg = parse(
            r#"
            [module.a]
            type = "sum"

            [module.b]
            type = "sum"
            after = ["a"]

            [[link]]
            from = "a"
            from_key = "a"
            to = "b"
            to_key = "b"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.module.len(), 2);
        assert_eq!(cfg.link.len(), 1);
    }
}
