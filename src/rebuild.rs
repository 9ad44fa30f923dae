//! Single-flight background rebuilds.
//!
//! One dedicated worker thread runs rebuild jobs. The coordinator is a small
//! state machine guarded by a single mutex:
//!
//! ```text
//!  Idle --request--> Rebuilding { pending: false } --request--> Rebuilding { pending: true }
//!   ^                        |                                         |
//!   +----- job returns ------+            job returns: run once more <-+
//! ```
//!
//! Requests that arrive while a rebuild is running fill a single pending
//! slot; once the slot is full further requests are dropped. The job itself
//! always runs outside the lock, so callers of [`RebuildCoordinator::request`]
//! never wait on embedding work.

use crate::error::IndexResult;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// A rebuild job. Returns the number of indexed entries.
pub type RebuildJob = Box<dyn Fn() -> IndexResult<usize> + Send + Sync>;

/// What happened to a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildTrigger {
    /// The coordinator was idle and a rebuild has started.
    Started,
    /// A rebuild is running; one more will run after it.
    Coalesced,
    /// A rebuild is running and one is already pending; nothing was scheduled.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RebuildState {
    Idle,
    Rebuilding { pending: bool },
}

/// Counters describing the coordinator's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub coalesced: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    coalesced: AtomicU64,
    dropped: AtomicU64,
}

struct Shared {
    state: Mutex<RebuildState>,
    idle: Condvar,
    counters: Counters,
}

/// Runs rebuild jobs on a dedicated worker, at most one at a time.
pub struct RebuildCoordinator {
    shared: Arc<Shared>,
    wake: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RebuildCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildCoordinator")
            .field("state", &*self.shared.state.lock())
            .field("stats", &self.stats())
            .finish()
    }
}

impl RebuildCoordinator {
    /// Spawn the worker thread.
    pub fn new(job: RebuildJob) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(RebuildState::Idle),
            idle: Condvar::new(),
            counters: Counters::default(),
        });
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("projmatch-rebuild".to_string())
            .spawn(move || worker_loop(&worker_shared, &wake_rx, &job))?;

        Ok(Self {
            shared,
            wake: Mutex::new(Some(wake_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Ask for a rebuild without waiting for it.
    pub fn request(&self) -> RebuildTrigger {
        let mut state = self.shared.state.lock();
        match *state {
            RebuildState::Rebuilding { pending: false } => {
                *state = RebuildState::Rebuilding { pending: true };
                self.shared.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Rebuild already running, scheduled one follow-up rebuild");
                RebuildTrigger::Coalesced
            }
            RebuildState::Rebuilding { pending: true } => {
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Rebuild already running with one pending, request dropped");
                RebuildTrigger::Dropped
            }
            RebuildState::Idle => {
                let sent = self
                    .wake
                    .lock()
                    .as_ref()
                    .is_some_and(|wake| wake.try_send(()).is_ok());
                if sent {
                    *state = RebuildState::Rebuilding { pending: false };
                    RebuildTrigger::Started
                } else {
                    self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Rebuild worker is not running, request dropped");
                    RebuildTrigger::Dropped
                }
            }
        }
    }

    /// True while a rebuild is running.
    pub fn is_rebuilding(&self) -> bool {
        matches!(*self.shared.state.lock(), RebuildState::Rebuilding { .. })
    }

    /// Block until the coordinator is idle or `timeout` elapses.
    ///
    /// Returns `true` if the coordinator is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while *state != RebuildState::Idle {
            if self
                .shared
                .idle
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return *state == RebuildState::Idle;
            }
        }
        true
    }

    pub fn stats(&self) -> RebuildStats {
        let counters = &self.shared.counters;
        RebuildStats {
            started: counters.started.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting requests and join the worker.
    ///
    /// A rebuild in progress (and a pending one) still runs to completion.
    pub fn shutdown(&self) {
        self.wake.lock().take();
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Rebuild worker panicked");
        }
    }
}

impl Drop for RebuildCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, wake: &Receiver<()>, job: &RebuildJob) {
    for () in wake.iter() {
        loop {
            run_job(shared, job);

            let mut state = shared.state.lock();
            if *state == (RebuildState::Rebuilding { pending: true }) {
                *state = RebuildState::Rebuilding { pending: false };
                continue;
            }
            *state = RebuildState::Idle;
            shared.idle.notify_all();
            break;
        }
    }
    tracing::debug!("Rebuild worker stopped");
}

fn run_job(shared: &Shared, job: &RebuildJob) {
    shared.counters.started.fetch_add(1, Ordering::Relaxed);
    tracing::info!("Index rebuild started");
    let started = Instant::now();

    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(count)) => {
            shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                "Index rebuild finished: {count} projects in {:.2?}",
                started.elapsed()
            );
        }
        Ok(Err(e)) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Index rebuild failed, keeping previous index: {e}");
        }
        Err(_) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Index rebuild panicked, keeping previous index");
        }
    }
}
