// src/module/builtin.rs

//! Module types shipped with cascade.

use std::path::Path;
use std::sync::OnceLock;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::module::{Module, ModuleMetadata, Parameters, code_version_of};
use crate::registry::ModuleCatalog;

static SOURCE: &str = include_str!("builtin.rs");

fn code_version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| code_version_of(SOURCE))
}

/// Register every builtin type in `catalog`.
pub fn register_builtins(catalog: &mut ModuleCatalog) {
    catalog.register(
        ModuleMetadata {
            name: SumModule::TYPE.to_string(),
            version: "1.0.0".to_string(),
            summary: "Adds parameters `a` and `b`".to_string(),
            tags: vec!["example".to_string(), "arithmetic".to_string()],
        },
        || Box::new(SumModule::default()),
    );
    catalog.register(
        ModuleMetadata {
            name: DagDebugModule::TYPE.to_string(),
            version: "1.0.0".to_string(),
            summary: "Logs its inputs to check DAG wiring".to_string(),
            tags: vec!["debug".to_string(), "dag".to_string()],
        },
        || Box::new(DagDebugModule),
    );
}

/// Adds two numeric parameters.
#[derive(Debug, Default)]
pub struct SumModule {
    a: f64,
    b: f64,
    total: Option<f64>,
}

impl SumModule {
    pub const TYPE: &'static str = "sum";
}

impl Module for SumModule {
    fn basename(&self) -> &str {
        Self::TYPE
    }

    fn code_version_hash(&self) -> &str {
        code_version()
    }

    fn default_parameters(&self) -> Parameters {
        [("a", 0), ("b", 0)].into_iter().collect()
    }

    fn describe(&self) -> String {
        "adds parameters `a` and `b`".to_string()
    }

    fn init(&mut self, params: &mut Parameters) -> anyhow::Result<()> {
        self.a = params.get_f64("a").unwrap_or(0.0);
        self.b = params.get_f64("b").unwrap_or(0.0);
        Ok(())
    }

    fn execute(&mut self, _params: &mut Parameters) -> anyhow::Result<Value> {
        let total = self.a + self.b;
        self.total = Some(total);
        Ok(json!(total))
    }

    fn finalize(&mut self, _params: &mut Parameters) -> anyhow::Result<()> {
        if let Some(total) = self.total {
            info!(a = self.a, b = self.b, total, "sum finished");
        }
        Ok(())
    }
}

/// Logs its `input` parameters and whether `input` points at an existing path.
#[derive(Debug, Default)]
pub struct DagDebugModule;

impl DagDebugModule {
    pub const TYPE: &'static str = "dag_debug";
}

impl Module for DagDebugModule {
    fn basename(&self) -> &str {
        Self::TYPE
    }

    fn code_version_hash(&self) -> &str {
        code_version()
    }

    fn default_parameters(&self) -> Parameters {
        [("input", "skim.root"), ("input_hist", "hists.root")]
            .into_iter()
            .collect()
    }

    fn describe(&self) -> String {
        "logs its inputs to check DAG wiring".to_string()
    }

    fn init(&mut self, params: &mut Parameters) -> anyhow::Result<()> {
        let input = params.get_str("input").unwrap_or_default();
        info!(
            input,
            input_hist = params.get_str("input_hist").unwrap_or_default(),
            "dag_debug inputs"
        );
        if Path::new(input).exists() {
            info!(input, "input found");
        } else {
            warn!(input, "input not found");
        }
        Ok(())
    }

    fn execute(&mut self, params: &mut Parameters) -> anyhow::Result<Value> {
        Ok(params.to_value())
    }

    fn finalize(&mut self, _params: &mut Parameters) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_adds_parameters() {
        let mut module = SumModule::default();
        let mut params = module.default_parameters();
        params.set("a", 2);
        params.set("b", 3.5);

        module.init(&mut params).unwrap();
        let result = module.execute(&mut params).unwrap();
        module.finalize(&mut params).unwrap();

        assert_eq!(result, json!(5.5));
    }

    #[test]
    fn builtins_share_a_source_derived_code_version() {
        assert_eq!(SumModule::default().code_version_hash(), code_version());
        assert_eq!(DagDebugModule.code_version_hash(), code_version());
        assert_eq!(code_version().len(), 16);
    }

    #[test]
    fn builtins_are_registered() {
        let mut catalog = ModuleCatalog::new();
        register_builtins(&mut catalog);
        let names = catalog.type_names();
        assert!(names.contains(&"sum".to_string()));
        assert!(names.contains(&"dag_debug".to_string()));
    }
}
