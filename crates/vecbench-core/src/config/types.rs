//! Configuration type definitions

use serde::{Deserialize, Serialize};

use crate::backend::BackendConfig;
use crate::dataset::{DatasetSource, SearchFilter};

/// Benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Concurrency levels, run in this order
    #[serde(default = "default_concurrencies")]
    pub concurrencies: Vec<usize>,

    /// Measurement window per level in seconds (saturate mode)
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,

    /// Search top-k
    #[serde(default = "default_k")]
    pub k: usize,

    /// Queries per search request
    #[serde(default = "default_nq")]
    pub nq: usize,

    /// Upper bound on waiting for all workers to register
    #[serde(default = "default_barrier_timeout_secs")]
    pub barrier_timeout_secs: f64,

    /// Slack after the run window before a level counts as stuck
    #[serde(default = "default_grace_secs")]
    pub grace_secs: f64,

    /// Filter applied to every request (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<SearchFilter>,

    /// Load pattern
    #[serde(default)]
    pub mode: ModeConfig,

    /// Where test queries come from
    #[serde(default)]
    pub dataset: DatasetSource,

    /// Backend under test
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            concurrencies: default_concurrencies(),
            duration_secs: default_duration_secs(),
            k: default_k(),
            nq: default_nq(),
            barrier_timeout_secs: default_barrier_timeout_secs(),
            grace_secs: default_grace_secs(),
            filter: None,
            mode: ModeConfig::default(),
            dataset: DatasetSource::default(),
            backend: BackendConfig::default(),
        }
    }
}

/// Load pattern configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModeConfig {
    /// Back-to-back requests to find saturation throughput
    #[default]
    Saturate,
    /// Stepped request rate to find where latency or errors break down
    Paced {
        #[serde(default = "default_intervals_ms")]
        intervals_ms: Vec<f64>,
        #[serde(default = "default_window_secs")]
        window_secs: f64,
        #[serde(default = "default_settle_secs")]
        settle_secs: f64,
    },
}

impl ModeConfig {
    /// Paced mode with the stock schedule
    pub fn paced() -> Self {
        ModeConfig::Paced {
            intervals_ms: default_intervals_ms(),
            window_secs: default_window_secs(),
            settle_secs: default_settle_secs(),
        }
    }
}

fn default_concurrencies() -> Vec<usize> {
    vec![1, 5, 10, 15, 20, 25, 30, 35]
}

fn default_duration_secs() -> f64 {
    30.0
}

fn default_k() -> usize {
    100
}

fn default_nq() -> usize {
    1
}

fn default_barrier_timeout_secs() -> f64 {
    60.0
}

fn default_grace_secs() -> f64 {
    10.0
}

fn default_intervals_ms() -> Vec<f64> {
    vec![50.0, 45.0, 40.0, 35.0]
}

fn default_window_secs() -> f64 {
    180.0
}

fn default_settle_secs() -> f64 {
    10.0
}
