//! CLI argument parsing for vecbench
//!
//! Supports global flags: --format, --quiet, --verbose, --log-level, --log-json

pub mod args;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use args::{BackendKind, RunArgs};
pub use output::OutputFormat;

/// vecbench - find the maximum sustainable QPS of a vector-search backend
#[derive(Parser, Debug)]
#[command(name = "vecbench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Log worker and barrier progress at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log filter (e.g. `debug` or `vecbench_core=trace`)
    #[arg(long, global = true, env = "VECBENCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a concurrency sweep and report the maximum QPS
    Run(RunArgs),

    /// Print the default configuration as TOML
    Config {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}
