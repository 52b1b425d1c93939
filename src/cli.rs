// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cascade`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cascade",
    version,
    about = "Run a pipeline of modules in dependency order, skipping work that already ran.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Cascade.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Cascade.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CASCADE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan, but don't run any module.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the available module types and exit.
    #[arg(long)]
    pub list: bool,

    /// Write the DAG as Graphviz DOT to this path before running.
    #[arg(long, value_name = "PATH")]
    pub dot: Option<PathBuf>,

    /// Run independent branches concurrently (overrides `[settings].execution`).
    #[arg(long)]
    pub parallel: bool,

    /// Set `force_run` on every Local module, bypassing the duplicate check.
    #[arg(long)]
    pub force: bool,

    /// Directory for the run log (overrides config and `CASCADE_RUN_LOG_DIR`).
    #[arg(long, value_name = "DIR")]
    pub run_log_dir: Option<PathBuf>,

    /// Don't write a run log.
    #[arg(long)]
    pub no_run_log: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
