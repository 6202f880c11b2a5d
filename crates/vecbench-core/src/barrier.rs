//! Start barrier for one concurrency level
//!
//! Workers register once they are ready and then block until the
//! coordinator releases them all at once. The release instant is handed
//! back to every worker so all measurement windows share one origin.
//! Both sides wait on condition variables with a bound, never by polling.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::BarrierError;

#[derive(Debug, Default)]
struct BarrierState {
    registered: HashSet<usize>,
    withdrawn: Option<(usize, String)>,
    released_at: Option<Instant>,
    aborted: bool,
}

/// Counting start barrier with a single release signal
#[derive(Debug)]
pub struct StartBarrier {
    expected: usize,
    state: Mutex<BarrierState>,
    /// Wakes the coordinator on registration or withdrawal
    coordinator: Condvar,
    /// Wakes workers on release or abort
    workers: Condvar,
}

impl StartBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(BarrierState::default()),
            coordinator: Condvar::new(),
            workers: Condvar::new(),
        }
    }

    /// Number of distinct workers registered so far
    pub fn registered(&self) -> usize {
        self.lock().registered.len()
    }

    /// Mark a worker as ready. Duplicate registrations are ignored.
    pub fn register(&self, worker_id: usize) {
        let mut state = self.lock();
        if state.registered.insert(worker_id) {
            tracing::trace!(worker_id, registered = state.registered.len(), "worker_registered");
        }
        drop(state);
        self.coordinator.notify_all();
    }

    /// A worker that cannot become ready gives up its slot
    pub fn withdraw(&self, worker_id: usize, reason: impl Into<String>) {
        let mut state = self.lock();
        if state.withdrawn.is_none() {
            state.withdrawn = Some((worker_id, reason.into()));
        }
        drop(state);
        self.coordinator.notify_all();
    }

    /// Block until every expected worker has registered, one withdraws, or
    /// the timeout expires.
    pub fn wait_for_registrations(&self, timeout: Duration) -> Result<(), BarrierError> {
        let started = Instant::now();
        let guard = self.lock();
        let (state, _) = self
            .coordinator
            .wait_timeout_while(guard, timeout, |s| {
                s.registered.len() < self.expected && s.withdrawn.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if let Some((worker_id, reason)) = &state.withdrawn {
            return Err(BarrierError::Withdrawn {
                worker_id: *worker_id,
                reason: reason.clone(),
            });
        }
        if state.registered.len() < self.expected {
            return Err(BarrierError::Timeout {
                expected: self.expected,
                registered: state.registered.len(),
                waited: started.elapsed(),
            });
        }
        Ok(())
    }

    /// Release every waiting worker. Returns the release instant; repeated
    /// calls return the instant of the first release.
    pub fn release_all(&self) -> Instant {
        let mut state = self.lock();
        let released_at = *state.released_at.get_or_insert_with(Instant::now);
        drop(state);
        self.workers.notify_all();
        released_at
    }

    /// Block a worker until release. Returns the shared release instant.
    pub fn await_release(&self, timeout: Duration) -> Result<Instant, BarrierError> {
        let started = Instant::now();
        let guard = self.lock();
        let (state, _) = self
            .workers
            .wait_timeout_while(guard, timeout, |s| s.released_at.is_none() && !s.aborted)
            .unwrap_or_else(PoisonError::into_inner);

        if state.aborted {
            return Err(BarrierError::Aborted);
        }
        state.released_at.ok_or_else(|| BarrierError::Timeout {
            expected: self.expected,
            registered: state.registered.len(),
            waited: started.elapsed(),
        })
    }

    /// Coordinator gives up; every waiting worker returns `Aborted`
    pub fn abort(&self) {
        self.lock().aborted = true;
        self.workers.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_no_worker_passes_before_release() {
        let barrier = Arc::new(StartBarrier::new(3));
        let passed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|id| {
                let barrier = Arc::clone(&barrier);
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    barrier.register(id);
                    let released_at = barrier.await_release(WAIT).unwrap();
                    passed.fetch_add(1, Ordering::SeqCst);
                    released_at
                })
            })
            .collect();

        barrier.wait_for_registrations(WAIT).unwrap();
        assert_eq!(barrier.registered(), 3);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(passed.load(Ordering::SeqCst), 0);

        let released_at = barrier.release_all();
        let seen: Vec<Instant> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(passed.load(Ordering::SeqCst), 3);
        assert!(seen.iter().all(|t| *t == released_at));
    }

    #[test]
    fn test_registration_timeout() {
        let barrier = StartBarrier::new(2);
        barrier.register(0);

        let err = barrier
            .wait_for_registrations(Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(
            err,
            BarrierError::Timeout {
                expected: 2,
                registered: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_registration_counts_once() {
        let barrier = StartBarrier::new(2);
        barrier.register(1);
        barrier.register(1);
        assert_eq!(barrier.registered(), 1);
        assert!(barrier
            .wait_for_registrations(Duration::from_millis(10))
            .is_err());
    }

    #[test]
    fn test_withdraw_wakes_coordinator() {
        let barrier = Arc::new(StartBarrier::new(2));
        let worker = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.withdraw(1, "session refused"))
        };

        let started = Instant::now();
        let err = barrier.wait_for_registrations(WAIT).unwrap_err();
        worker.join().unwrap();

        assert!(started.elapsed() < WAIT);
        assert_eq!(
            err,
            BarrierError::Withdrawn {
                worker_id: 1,
                reason: "session refused".to_string()
            }
        );
    }

    #[test]
    fn test_abort_unblocks_waiters() {
        let barrier = Arc::new(StartBarrier::new(1));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.await_release(WAIT))
        };

        thread::sleep(Duration::from_millis(20));
        barrier.abort();
        assert_eq!(waiter.join().unwrap(), Err(BarrierError::Aborted));
    }

    #[test]
    fn test_release_is_sticky() {
        let barrier = StartBarrier::new(1);
        let first = barrier.release_all();
        let second = barrier.release_all();
        assert_eq!(first, second);
        assert_eq!(barrier.await_release(Duration::ZERO), Ok(first));
    }
}
