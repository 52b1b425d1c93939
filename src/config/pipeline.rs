// src/config/pipeline.rs

//! Turn a validated [`PipelineConfig`] into registered modules and a DAG.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::model::PipelineConfig;
use crate::controller::ExecutionController;
use crate::dag::DagScheduler;
use crate::errors::{CascadeError, Result};

/// Register every configured module with `controller`, apply parameters and
/// links, and return a scheduler with one node per module.
///
/// Module types missing from the catalog are looked up by instance name in
/// the controller's foreign runtime.
pub fn build_pipeline(
    cfg: &PipelineConfig,
    controller: &Arc<ExecutionController>,
    base_dir: &Path,
) -> Result<DagScheduler> {
    for (name, module) in &cfg.module {
        match controller.create_module(&module.module_type, Some(name)) {
            Ok(_) => {
                let params = module.parameters(base_dir)?;
                controller.set_params(name, params)?;
            }
            Err(CascadeError::UnknownModuleType(type_name)) => {
                if controller.register_foreign(name).is_err() {
                    return Err(CascadeError::UnknownModuleType(type_name));
                }
                if !module.params.is_empty() || module.params_file.is_some() {
                    warn!(module = %name, "parameters ignored for foreign module");
                }
            }
            Err(e) => return Err(e),
        }
    }

    for link in &cfg.link {
        controller.link_param(&link.from, &link.from_key, &link.to, &link.to_key)?;
    }

    let mut dag = DagScheduler::new();
    for (name, module) in &cfg.module {
        controller.add_dag_node(&mut dag, name, module.after.iter().cloned())?;
    }

    info!(
        modules = cfg.module.len(),
        links = cfg.link.len(),
        "pipeline built"
    );
    Ok(dag)
}
