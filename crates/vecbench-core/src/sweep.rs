//! Concurrency sweep orchestrator
//!
//! Runs the configured concurrency levels one after another and keeps the
//! best throughput. A failing level ends the sweep: if an earlier level
//! succeeded the best result so far is returned, otherwise the failure is
//! escalated. The shared dataset is released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::VectorDb;
use crate::bail_invalid;
use crate::dataset::SharedDataset;
use crate::error::{BenchError, LevelError, Result};
use crate::runner::{LevelRunner, LevelTiming, SampleResult};
use crate::worker::SearchParams;

/// Everything that shapes one sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    /// Levels in the order they run
    pub concurrencies: Vec<usize>,
    pub params: SearchParams,
    pub timing: LevelTiming,
}

/// The level that ended a degraded sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelFailure {
    pub concurrency: usize,
    pub reason: String,
}

/// Best throughput of a sweep and every sample that led to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    pub started_at: DateTime<Utc>,
    pub backend: String,
    pub max_qps: f64,
    /// Concurrency level that achieved `max_qps`
    pub concurrency: usize,
    pub samples: Vec<SampleResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<LevelFailure>,
}

impl SweepResult {
    pub fn is_degraded(&self) -> bool {
        self.aborted_at.is_some()
    }
}

pub struct SweepOrchestrator {
    db: Arc<dyn VectorDb>,
    dataset: SharedDataset,
    settings: SweepSettings,
    interrupt: Arc<AtomicBool>,
}

impl SweepOrchestrator {
    pub fn new(db: Arc<dyn VectorDb>, dataset: SharedDataset, settings: SweepSettings) -> Self {
        Self {
            db,
            dataset,
            settings,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an interrupt flag, e.g. one raised from a Ctrl-C handler
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn dataset(&self) -> &SharedDataset {
        &self.dataset
    }

    /// Run every level. The dataset is released afterwards whatever the
    /// outcome, so a second call fails with `DatasetReleased`.
    pub fn run(&self) -> Result<SweepResult> {
        let _release = ReleaseOnDrop(&self.dataset);
        self.sweep()
    }

    fn sweep(&self) -> Result<SweepResult> {
        if self.settings.concurrencies.is_empty() {
            bail_invalid!("concurrencies", "at least one level is required");
        }

        let runner = LevelRunner::new(
            Arc::clone(&self.db),
            self.dataset.handle()?,
            self.settings.params.clone(),
            self.settings.timing,
        )?
        .with_interrupt(Arc::clone(&self.interrupt));

        let started_at = Utc::now();
        let mut samples: Vec<SampleResult> = Vec::new();
        let mut best: Option<usize> = None;
        let mut aborted_at = None;

        for &concurrency in &self.settings.concurrencies {
            let outcome = if self.interrupt.load(Ordering::SeqCst) {
                Err(LevelError::Interrupted { concurrency })
            } else {
                runner.run(concurrency)
            };

            match outcome {
                Ok(sample) => {
                    if best.map_or(true, |i| sample.qps > samples[i].qps) {
                        tracing::info!(
                            concurrency,
                            max_qps = sample.qps,
                            "update largest qps"
                        );
                        best = Some(samples.len());
                    }
                    samples.push(sample);
                }
                Err(err) => {
                    let best_qps = best.map_or(0.0, |i| samples[i].qps);
                    tracing::warn!(
                        concurrency,
                        concurrencies = ?self.settings.concurrencies,
                        max_qps_before_failure = best_qps,
                        error = %err,
                        "failed to search all concurrencies"
                    );
                    if best.is_none() {
                        return Err(match err {
                            LevelError::Interrupted { .. } => BenchError::Interrupted,
                            source => BenchError::SweepAborted {
                                concurrency,
                                source,
                            },
                        });
                    }
                    aborted_at = Some(LevelFailure {
                        concurrency,
                        reason: err.to_string(),
                    });
                    break;
                }
            }
        }

        let best = best.ok_or_else(|| BenchError::Other("sweep produced no samples".into()))?;
        Ok(SweepResult {
            started_at,
            backend: self.db.name().to_string(),
            max_qps: samples[best].qps,
            concurrency: samples[best].concurrency,
            samples,
            aborted_at,
        })
    }
}

/// Releases the dataset when dropped, including during unwinding
struct ReleaseOnDrop<'a>(&'a SharedDataset);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
