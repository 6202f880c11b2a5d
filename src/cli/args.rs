use std::path::PathBuf;

use clap::{Args, ValueEnum};

/// Backends bundled with vecbench
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Brute-force in-memory index
    Flat,
    /// Fixed-latency stub
    Simulated,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Configuration file (defaults to the user config, then built-in defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Concurrency levels to sweep, in order (e.g. 1,5,10)
    #[arg(long, short = 'c', value_delimiter = ',')]
    pub concurrency: Vec<usize>,

    /// Seconds per concurrency level
    #[arg(long, short)]
    pub duration: Option<f64>,

    /// Search top-k
    #[arg(long, short)]
    pub k: Option<usize>,

    /// Queries per search request
    #[arg(long)]
    pub nq: Option<usize>,

    /// Only match rows with id >= this bound
    #[arg(long)]
    pub filter_id_gte: Option<u64>,

    /// Step the request rate instead of saturating the backend
    #[arg(long)]
    pub paced: bool,

    /// JSON file of query vectors (array of arrays of floats)
    #[arg(long)]
    pub queries: Option<PathBuf>,

    /// Backend to benchmark
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Per-request latency of the simulated backend in milliseconds
    #[arg(long)]
    pub latency_ms: Option<f64>,
}
