//! Fixed-latency backend stub
//!
//! Every call sleeps for the configured latency and returns `k` rows per
//! query. With `fail_after` set, the call after that many successful calls
//! (counted across all sessions) and every later call fails with a
//! transport error.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::{DbSession, VectorDb};
use crate::dataset::{QueryVector, SearchFilter};
use crate::error::SearchError;

#[derive(Debug, Default)]
pub struct SimulatedDb {
    latency: Duration,
    fail_after: Option<u64>,
    calls: AtomicU64,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
}

impl SimulatedDb {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn with_fail_after(mut self, fail_after: Option<u64>) -> Self {
        self.fail_after = fail_after;
        self
    }

    /// Total search calls attempted
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sessions currently entered and not yet exited
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions entered since creation
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }
}

impl VectorDb for SimulatedDb {
    fn name(&self) -> &str {
        "simulated"
    }

    fn session(&self) -> Result<Box<dyn DbSession + '_>, SearchError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedSession { db: self }))
    }
}

struct SimulatedSession<'a> {
    db: &'a SimulatedDb,
}

impl DbSession for SimulatedSession<'_> {
    fn search_batch(
        &mut self,
        queries: &[QueryVector],
        k: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<usize, SearchError> {
        let call = self.db.calls.fetch_add(1, Ordering::SeqCst);
        if self.db.fail_after.is_some_and(|limit| call >= limit) {
            return Err(SearchError::Transport(format!(
                "injected failure on call {}",
                call + 1
            )));
        }
        if !self.db.latency.is_zero() {
            thread::sleep(self.db.latency);
        }
        Ok(queries.len() * k)
    }
}

impl Drop for SimulatedSession<'_> {
    fn drop(&mut self) {
        self.db.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
