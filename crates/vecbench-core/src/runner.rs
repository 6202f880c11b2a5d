//! Concurrency level runner
//!
//! Runs one sample: spawns `conc` workers, drives the start barrier,
//! collects per-worker counts and turns them into a throughput number.
//! The measurement window starts at the barrier release, not at thread
//! spawn, so startup skew never shows up in the reported QPS.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::backend::VectorDb;
use crate::bail_invalid;
use crate::barrier::StartBarrier;
use crate::dataset::{BatchCursor, DatasetHandle};
use crate::error::{BarrierError, LevelError, Result, WorkerError};
use crate::worker::{SearchParams, SearchWorker, WorkerResult};

/// Bounds on how long the runner waits for its workers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelTiming {
    /// Maximum wait for all workers to register
    pub barrier_timeout: Duration,
    /// Slack after the run window before unfinished workers count as stuck
    pub grace: Duration,
}

impl Default for LevelTiming {
    fn default() -> Self {
        Self {
            barrier_timeout: Duration::from_secs(60),
            grace: Duration::from_secs(10),
        }
    }
}

/// One point of the sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleResult {
    pub concurrency: usize,
    /// Completed queries summed over all workers
    pub count: u64,
    /// Seconds from barrier release until the last worker reported
    pub elapsed_secs: f64,
    pub qps: f64,
    pub workers: Vec<WorkerResult>,
}

impl SampleResult {
    pub fn from_workers(concurrency: usize, mut workers: Vec<WorkerResult>, elapsed: Duration) -> Self {
        workers.sort_by_key(|w| w.worker_id);
        let count = workers.iter().map(|w| w.completed).sum();
        let elapsed_secs = elapsed.as_secs_f64();
        let qps = if elapsed_secs > 0.0 {
            count as f64 / elapsed_secs
        } else {
            0.0
        };

        Self {
            concurrency,
            count,
            elapsed_secs,
            qps,
            workers,
        }
    }
}

/// What a worker thread sends back when it exits
struct WorkerReport {
    worker_id: usize,
    outcome: std::thread::Result<std::result::Result<WorkerResult, WorkerError>>,
}

#[derive(Default)]
struct Collected {
    results: Vec<WorkerResult>,
    failures: Vec<(usize, WorkerError)>,
    panicked: Option<usize>,
    reported: Vec<usize>,
}

impl Collected {
    /// First failure that is not just a reaction to the barrier being aborted
    fn root_failure(&mut self) -> Option<(usize, WorkerError)> {
        let pos = self
            .failures
            .iter()
            .position(|(_, e)| *e != WorkerError::Barrier(BarrierError::Aborted))
            .or_else(|| (!self.failures.is_empty()).then_some(0))?;
        Some(self.failures.swap_remove(pos))
    }
}

/// Runs single concurrency levels against one backend and dataset
pub struct LevelRunner {
    db: Arc<dyn VectorDb>,
    dataset: DatasetHandle,
    cursor: BatchCursor,
    params: Arc<SearchParams>,
    timing: LevelTiming,
    interrupt: Arc<AtomicBool>,
}

impl LevelRunner {
    /// Fails when the batch size does not fit the dataset or the level
    /// window cannot be placed on the clock
    pub fn new(
        db: Arc<dyn VectorDb>,
        dataset: DatasetHandle,
        params: SearchParams,
        timing: LevelTiming,
    ) -> Result<Self> {
        let cursor = BatchCursor::new(dataset.read().len(), params.nq)?;

        let horizon = params
            .run_length()
            .checked_add(timing.grace)
            .and_then(|limit| limit.checked_add(timing.barrier_timeout.saturating_mul(2)));
        if horizon.and_then(|h| Instant::now().checked_add(h)).is_none() {
            bail_invalid!("level window", format!("{:?}", params.run_length()));
        }
        Ok(Self {
            db,
            dataset,
            cursor,
            params: Arc::new(params),
            timing,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an interrupt flag; raising it stops the running level
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn run(&self, concurrency: usize) -> std::result::Result<SampleResult, LevelError> {
        let barrier = Arc::new(StartBarrier::new(concurrency));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        tracing::info!(
            concurrency,
            duration_secs = self.params.run_length().as_secs_f64(),
            "start search"
        );

        let mut handles = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            match self.spawn_worker(worker_id, concurrency, &barrier, &stop, tx.clone()) {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(source) => {
                    barrier.abort();
                    stop.store(true, Ordering::SeqCst);
                    drop(tx);
                    let collected = collect(&rx, handles.len(), Instant::now() + self.timing.grace, &stop);
                    teardown(handles, &collected);
                    return Err(LevelError::Spawn { worker_id, source });
                }
            }
        }
        drop(tx);

        if let Err(source) = barrier.wait_for_registrations(self.timing.barrier_timeout) {
            barrier.abort();
            stop.store(true, Ordering::SeqCst);
            let mut collected = collect(&rx, concurrency, Instant::now() + self.timing.grace, &stop);
            teardown(handles, &collected);
            return Err(match source {
                BarrierError::Withdrawn { worker_id, .. } => {
                    let (worker_id, source) = collected
                        .root_failure()
                        .unwrap_or((worker_id, WorkerError::Barrier(source)));
                    LevelError::WorkerFailed {
                        concurrency,
                        worker_id,
                        source,
                    }
                }
                source => LevelError::BarrierTimeout {
                    concurrency,
                    source,
                },
            });
        }

        let released_at = barrier.release_all();
        tracing::info!(concurrency, "syncing all workers and starting concurrent search");

        let limit = self.params.run_length().saturating_add(self.timing.grace);
        let Some(deadline) = released_at.checked_add(limit) else {
            stop.store(true, Ordering::SeqCst);
            let collected = collect(&rx, concurrency, Instant::now() + self.timing.grace, &stop);
            teardown(handles, &collected);
            return Err(LevelError::WindowOverflow { concurrency, limit });
        };
        let mut collected = collect(&rx, concurrency, deadline, &stop);
        let elapsed = released_at.elapsed();
        if collected.reported.len() < concurrency {
            stop.store(true, Ordering::SeqCst);
        }
        teardown(handles, &collected);

        if let Some(worker_id) = collected.panicked {
            return Err(LevelError::WorkerPanicked {
                concurrency,
                worker_id,
            });
        }
        if let Some((worker_id, source)) = collected.root_failure() {
            return Err(LevelError::WorkerFailed {
                concurrency,
                worker_id,
                source,
            });
        }
        if collected.reported.len() < concurrency {
            return Err(LevelError::WorkerTimeout {
                concurrency,
                missing: concurrency - collected.reported.len(),
                limit,
            });
        }
        if self.interrupt.load(Ordering::SeqCst) {
            return Err(LevelError::Interrupted { concurrency });
        }

        let sample = SampleResult::from_workers(concurrency, collected.results, elapsed);
        tracing::info!(
            concurrency,
            dur = sample.elapsed_secs,
            total_count = sample.count,
            qps = sample.qps,
            "end search"
        );
        Ok(sample)
    }

    fn spawn_worker(
        &self,
        worker_id: usize,
        concurrency: usize,
        barrier: &Arc<StartBarrier>,
        stop: &Arc<AtomicBool>,
        tx: Sender<WorkerReport>,
    ) -> std::io::Result<JoinHandle<()>> {
        let worker = SearchWorker {
            id: worker_id,
            concurrency,
            db: Arc::clone(&self.db),
            dataset: self.dataset.clone(),
            cursor: self.cursor.clone(),
            params: Arc::clone(&self.params),
            barrier: Arc::clone(barrier),
            // Outlasts the coordinator's own bounded wait, which aborts the
            // barrier on expiry
            release_timeout: self.timing.barrier_timeout.saturating_mul(2),
            stop: Arc::clone(stop),
            interrupt: Arc::clone(&self.interrupt),
        };

        thread::Builder::new()
            .name(format!("vecbench-worker-{concurrency}-{worker_id}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run()));
                // The runner may have given up on this level already
                let _ = tx.send(WorkerReport { worker_id, outcome });
            })
    }
}

/// Receive worker reports until `expected` arrived or `deadline` passed.
/// The first failure raises `stop` so healthy siblings wind down early.
fn collect(
    rx: &Receiver<WorkerReport>,
    expected: usize,
    deadline: Instant,
    stop: &AtomicBool,
) -> Collected {
    let mut collected = Collected::default();

    while collected.reported.len() < expected {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let report = match rx.recv_timeout(timeout) {
            Ok(report) => report,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        };

        collected.reported.push(report.worker_id);
        match report.outcome {
            Ok(Ok(result)) => collected.results.push(result),
            Ok(Err(e)) => {
                stop.store(true, Ordering::SeqCst);
                collected.failures.push((report.worker_id, e));
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                collected.panicked.get_or_insert(report.worker_id);
            }
        }
    }

    collected
}

/// Join every worker that reported; detach the rest, which exit on `stop`.
fn teardown(handles: Vec<(usize, JoinHandle<()>)>, collected: &Collected) {
    for (worker_id, handle) in handles {
        if collected.reported.contains(&worker_id) {
            let _ = handle.join();
        } else {
            tracing::warn!(worker_id, "detaching worker that did not report in time");
        }
    }
}
