//! Database capability driven by the benchmark
//!
//! The harness only ever sees [`VectorDb`] and [`DbSession`]. A session is
//! entered with [`VectorDb::session`] and exited when the box is dropped, so
//! connection resources are released on every exit path.

pub mod flat;
pub mod simulated;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::{QueryVector, SearchFilter};
use crate::error::{Result, SearchError};

pub use flat::FlatIndex;
pub use simulated::SimulatedDb;

/// A search backend under test
pub trait VectorDb: Send + Sync {
    /// Short backend name for logs and reports
    fn name(&self) -> &str;

    /// Enter a session. Dropping the returned box exits it.
    fn session(&self) -> std::result::Result<Box<dyn DbSession + '_>, SearchError>;
}

/// Connection-scoped search calls
pub trait DbSession {
    /// Run one search request for a batch of queries.
    ///
    /// Returns the number of result rows. Errors are propagated to the
    /// worker unchanged; sessions must not retry on the harness's behalf.
    fn search_batch(
        &mut self,
        queries: &[QueryVector],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> std::result::Result<usize, SearchError>;
}

/// Backend selection from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Brute-force in-memory index over `size` random base vectors
    Flat {
        #[serde(default = "default_flat_size")]
        size: usize,
        #[serde(default = "default_flat_seed")]
        seed: u64,
    },
    /// Fixed-latency stub, optionally failing after `fail_after` calls
    Simulated {
        #[serde(default = "default_latency_ms")]
        latency_ms: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fail_after: Option<u64>,
    },
}

fn default_flat_size() -> usize {
    10_000
}

fn default_flat_seed() -> u64 {
    7
}

fn default_latency_ms() -> f64 {
    1.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Flat {
            size: default_flat_size(),
            seed: default_flat_seed(),
        }
    }
}

impl BackendConfig {
    /// Build the backend. `dim` is the dimension of the test queries.
    pub fn build(&self, dim: usize) -> Result<Arc<dyn VectorDb>> {
        let db: Arc<dyn VectorDb> = match self {
            BackendConfig::Flat { size, seed } => Arc::new(FlatIndex::random(*size, dim, *seed)?),
            BackendConfig::Simulated {
                latency_ms,
                fail_after,
            } => {
                if !latency_ms.is_finite() || *latency_ms < 0.0 {
                    crate::bail_invalid!("backend.latency_ms", latency_ms);
                }
                let latency = std::time::Duration::from_secs_f64(latency_ms / 1000.0);
                Arc::new(SimulatedDb::new(latency).with_fail_after(*fail_after))
            }
        };
        tracing::debug!(backend = db.name(), dim, "backend_ready");
        Ok(db)
    }
}
