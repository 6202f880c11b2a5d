//! Search worker
//!
//! One worker runs on its own thread: it enters a database session,
//! registers with the start barrier, waits for release and then issues
//! search requests until its window closes. A failed request ends the
//! worker immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::backend::{DbSession, VectorDb};
use crate::barrier::StartBarrier;
use crate::dataset::{BatchCursor, DatasetHandle};
use crate::error::{SearchError, WorkerError};

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawned,
    Registered,
    Running,
    Done,
    Failed,
}

/// Rate schedule for paced runs.
///
/// The run lasts `window * intervals.len()`. During step `i` a worker sends
/// one request every `intervals[i]`; smaller intervals mean higher load.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingSchedule {
    pub intervals: Vec<Duration>,
    pub window: Duration,
    /// Pause after each interval change so the backend can settle
    pub settle: Duration,
}

impl Default for PacingSchedule {
    fn default() -> Self {
        Self {
            intervals: [50, 45, 40, 35]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            window: Duration::from_secs(180),
            settle: Duration::from_secs(10),
        }
    }
}

impl PacingSchedule {
    /// Total length of a paced run
    pub fn total(&self) -> Duration {
        self.window
            .saturating_mul(u32::try_from(self.intervals.len()).unwrap_or(u32::MAX))
    }

    /// Index of the interval active `elapsed` after release
    pub fn step_at(&self, elapsed: Duration) -> usize {
        let last = self.intervals.len().saturating_sub(1);
        if self.window.is_zero() {
            return last;
        }
        let step = (elapsed.as_secs_f64() / self.window.as_secs_f64()) as usize;
        step.min(last)
    }
}

/// How a worker issues load
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WorkerMode {
    /// Back-to-back requests for the configured duration
    #[default]
    Saturate,
    /// Requests on a stepped fixed cadence
    Paced(PacingSchedule),
}

/// Search parameters shared by every worker of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub k: usize,
    /// Queries per search request
    pub nq: usize,
    pub duration: Duration,
    pub mode: WorkerMode,
}

impl SearchParams {
    /// Length of one measurement window after release
    pub fn run_length(&self) -> Duration {
        match &self.mode {
            WorkerMode::Saturate => self.duration,
            WorkerMode::Paced(schedule) => schedule.total(),
        }
    }
}

/// Outcome of one worker's loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerResult {
    pub worker_id: usize,
    /// Completed queries (requests times `nq`)
    pub completed: u64,
    /// Seconds from barrier release to loop exit
    pub elapsed_secs: f64,
}

/// Everything a worker needs for one concurrency level
pub struct SearchWorker {
    pub id: usize,
    pub concurrency: usize,
    pub db: Arc<dyn VectorDb>,
    pub dataset: DatasetHandle,
    pub cursor: BatchCursor,
    pub params: Arc<SearchParams>,
    pub barrier: Arc<StartBarrier>,
    /// Upper bound on waiting for the start signal
    pub release_timeout: Duration,
    /// Raised by the level runner when a sibling fails
    pub stop: Arc<AtomicBool>,
    /// Raised on user interrupt; shared across levels
    pub interrupt: Arc<AtomicBool>,
}

impl SearchWorker {
    pub fn run(mut self) -> Result<WorkerResult, WorkerError> {
        let mut state = WorkerState::Spawned;
        let db = Arc::clone(&self.db);

        let mut session = match db.session() {
            Ok(session) => session,
            Err(e) => {
                self.barrier.withdraw(self.id, e.to_string());
                self.transition(&mut state, WorkerState::Failed);
                return Err(e.into());
            }
        };

        self.barrier.register(self.id);
        self.transition(&mut state, WorkerState::Registered);

        let released_at = self.barrier.await_release(self.release_timeout)?;
        self.transition(&mut state, WorkerState::Running);

        let outcome = match self.params.mode.clone() {
            WorkerMode::Saturate => self.saturate(session.as_mut(), released_at),
            WorkerMode::Paced(schedule) => self.paced(session.as_mut(), released_at, &schedule),
        };

        match outcome {
            Ok(completed) => {
                self.transition(&mut state, WorkerState::Done);
                Ok(WorkerResult {
                    worker_id: self.id,
                    completed,
                    elapsed_secs: released_at.elapsed().as_secs_f64(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    worker_id = self.id,
                    concurrency = self.concurrency,
                    error = %e,
                    "search request failed"
                );
                self.transition(&mut state, WorkerState::Failed);
                Err(e.into())
            }
        }
    }

    fn saturate(
        &mut self,
        session: &mut dyn DbSession,
        released_at: Instant,
    ) -> Result<u64, SearchError> {
        // Unbounded only if the window overflows the clock; stop still applies
        let deadline = released_at.checked_add(self.params.duration);
        let mut completed = 0;

        while deadline.map_or(true, |d| Instant::now() < d) && !self.should_stop() {
            completed += self.search_once(session)?;
        }
        Ok(completed)
    }

    fn paced(
        &mut self,
        session: &mut dyn DbSession,
        released_at: Instant,
        schedule: &PacingSchedule,
    ) -> Result<u64, SearchError> {
        let end = released_at.checked_add(schedule.total());
        let ended = |now: Instant| end.is_some_and(|end| now >= end);
        let mut completed = 0;
        let mut active_step = None;
        let mut next_at = released_at;

        loop {
            let now = Instant::now();
            if ended(now) || self.should_stop() {
                break;
            }

            let step = schedule.step_at(now - released_at);
            let interval = schedule.intervals[step];
            if active_step != Some(step) {
                if self.id == 0 {
                    let per_worker = 1.0 / interval.as_secs_f64();
                    tracing::info!(
                        interval_ms = interval.as_secs_f64() * 1000.0,
                        per_worker_rate = per_worker,
                        total_rate = per_worker * self.concurrency as f64,
                        "pacing step"
                    );
                }
                if active_step.is_some() {
                    let remaining = end.map_or(schedule.settle, |end| end.saturating_duration_since(now));
                    thread::sleep(schedule.settle.min(remaining));
                }
                active_step = Some(step);
                next_at = Instant::now();
            }

            next_at = match next_at.checked_add(interval) {
                Some(at) => at,
                None => break,
            };
            let wait = next_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
            if ended(Instant::now()) || self.should_stop() {
                break;
            }

            completed += self.search_once(session)?;
        }
        Ok(completed)
    }

    fn search_once(&mut self, session: &mut dyn DbSession) -> Result<u64, SearchError> {
        let dataset = self.dataset.read();
        let batch = dataset.batch(self.cursor.next_batch());
        session.search_batch(batch, self.params.k, dataset.filter())?;
        Ok(batch.len() as u64)
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.interrupt.load(Ordering::Relaxed)
    }

    fn transition(&self, state: &mut WorkerState, next: WorkerState) {
        tracing::debug!(
            worker_id = self.id,
            concurrency = self.concurrency,
            from = ?*state,
            to = ?next,
            "worker_state"
        );
        *state = next;
    }
}
