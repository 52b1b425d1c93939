// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dag;
pub mod errors;
pub mod foreign;
pub mod interrupt;
pub mod logging;
pub mod module;
pub mod registry;
pub mod runlog;
pub mod types;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

pub use crate::cache::DedupCache;
pub use crate::controller::{ControllerBuilder, ExecutionController};
pub use crate::dag::{ActionOutcome, DagReport, DagScheduler, NodeOutcome, ParamLink};
pub use crate::errors::CascadeError;
pub use crate::interrupt::InterruptToken;
pub use crate::module::{LocalModule, Module, ModuleMetadata, Parameters};
pub use crate::types::{ExecutionMode, ModuleKind, ModuleStatus};

use crate::cli::CliArgs;
use crate::config::{
    ControllerSettings, PipelineConfig, build_pipeline, config_base_dir, load_and_validate,
};
use crate::module::params::FORCE_RUN;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and controller settings
/// - module registration and DAG construction
/// - Ctrl-C handling (sets the interrupt token)
/// - sequential or parallel execution
/// - the run log
pub async fn run(args: CliArgs) -> Result<()> {
    if args.list {
        print_available();
        return Ok(());
    }

    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading pipeline from {}", config_path.display()))?;

    let mut settings = ControllerSettings::from_section(&cfg.settings);
    if let Some(dir) = &args.run_log_dir {
        settings.run_log_dir = dir.clone();
    }
    if args.parallel {
        settings.execution = ExecutionMode::Parallel;
    }

    let interrupt = InterruptToken::new();
    let controller = Arc::new(
        settings
            .controller_builder()
            .interrupt(interrupt.clone())
            .build(),
    );
    let mut dag = build_pipeline(&cfg, &controller, &config_base_dir(&config_path))?;

    if args.force {
        for name in cfg.module.keys() {
            if controller.module(name)?.kind() == ModuleKind::Local {
                controller.set_param(name, FORCE_RUN, true)?;
            }
        }
    }

    if let Some(dot_path) = &args.dot {
        fs::write(dot_path, controller.dag_to_dot(&dag))
            .with_context(|| format!("writing DOT file {}", dot_path.display()))?;
        info!(path = %dot_path.display(), "DAG diagram written");
    }

    if args.dry_run {
        print_dry_run(&cfg, &controller, &settings)?;
        return Ok(());
    }

    crate::interrupt::install_ctrl_c_handler(interrupt.clone());

    let report = match settings.execution {
        ExecutionMode::Sequential => {
            let ctrl = Arc::clone(&controller);
            tokio::task::spawn_blocking(move || ctrl.run_dag(&mut dag)).await??
        }
        ExecutionMode::Parallel => controller.run_dag_parallel(&mut dag).await?,
    };

    print_summary(&report);

    if !args.no_run_log {
        if let Some(path) = controller.save_run_log(Some(settings.run_log_dir.as_path())) {
            println!("run log: {}", path.display());
        }
    }

    if report.has_failures() {
        anyhow::bail!(
            "{} of {} modules did not complete",
            report.failures().count(),
            report.outcomes.len()
        );
    }
    Ok(())
}

fn print_available() {
    let controller = ExecutionController::builder()
        .cache(Arc::new(DedupCache::in_memory()))
        .build();

    println!("available module types:");
    for meta in controller.available_metadata() {
        println!("  - {} ({})", meta.name, meta.version);
        println!("      {}", meta.summary);
        if !meta.tags.is_empty() {
            println!("      tags: {}", meta.tags.join(", "));
        }
    }
}

/// Print modules, dependencies, parameters and links without running.
fn print_dry_run(
    cfg: &PipelineConfig,
    controller: &ExecutionController,
    settings: &ControllerSettings,
) -> Result<()> {
    println!("cascade dry-run");
    println!("  execution = {:?}", settings.execution);
    println!("  cache = {}", controller.cache().location());
    println!("  run_log_dir = {}", settings.run_log_dir.display());
    println!();

    println!("modules ({}):", cfg.module.len());
    for (name, module) in &cfg.module {
        println!("  - {name} [{}]", module.module_type);
        println!("      {}", controller.describe(name)?);
        if !module.after.is_empty() {
            println!("      after: {:?}", module.after);
        }
        println!("      params: {}", controller.parameters(name)?);
    }

    let links = controller.param_links();
    if !links.is_empty() {
        println!();
        println!("links ({}):", links.len());
        for link in links {
            println!("  - {link}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_summary(report: &DagReport) {
    println!("run summary:");
    for name in &report.order {
        if let Some(outcome) = report.outcome(name) {
            println!("  {name}: {outcome}");
        }
    }
}
