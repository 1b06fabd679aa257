//! Bounded decode worker pool with per-attempt timeouts.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Shared cancellation flag observed by long-running backend calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raw flag in the form the FFmpeg provider polls.
    pub fn as_flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// Outcome of one pooled attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    Completed(T),
    /// The deadline elapsed; the attempt's token has been cancelled.
    TimedOut,
    /// No idle worker was available, or the pool is shut down.
    Rejected,
    /// The attempt panicked before producing a value.
    Crashed,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
struct PoolState {
    idle: usize,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PoolState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed set of worker threads; a submission is rejected rather than queued
/// when every worker is busy.
pub struct DecodePool {
    shared: Arc<Shared>,
    jobs: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl DecodePool {
    /// Starts `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                idle: 0,
                closed: false,
            }),
            changed: Condvar::new(),
        });
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let worker_shared = Arc::clone(&shared);
            let worker_rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("decode-worker-{index}"))
                .spawn(move || worker_loop(worker_shared, worker_rx));
            match spawned {
                Ok(handle) => {
                    shared.lock().idle += 1;
                    workers.push(handle);
                }
                Err(err) => warn!(index, error = %err, "failed to spawn decode worker"),
            }
        }
        debug!(workers = workers.len(), "decode pool started");

        Self {
            size: workers.len(),
            shared,
            jobs: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.lock().idle
    }

    /// Runs `job` on an idle worker and waits up to `timeout` for its value.
    ///
    /// On timeout the job's token is cancelled and the caller moves on; the
    /// worker stays busy until the job notices the token and returns.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use video_engine::pool::{Attempt, DecodePool};
    ///
    /// let pool = DecodePool::new(1);
    /// let result = pool.run_with_timeout(Duration::from_secs(1), |_cancel| 7);
    /// assert_eq!(result, Attempt::Completed(7));
    /// ```
    pub fn run_with_timeout<T, F>(&self, timeout: Duration, job: F) -> Attempt<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let (tx, rx) = mpsc::sync_channel::<T>(1);
        let submitted = self.try_submit(Box::new(move || {
            let value = job(&worker_token);
            let _ = tx.send(value);
        }));
        if !submitted {
            return Attempt::Rejected;
        }

        match rx.recv_timeout(timeout) {
            Ok(value) => Attempt::Completed(value),
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                Attempt::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => Attempt::Crashed,
        }
    }

    fn try_submit(&self, job: Job) -> bool {
        let mut state = self.shared.lock();
        if state.closed || state.idle == 0 {
            return false;
        }
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = jobs.as_ref() else {
            return false;
        };
        if sender.send(job).is_err() {
            return false;
        }
        state.idle -= 1;
        true
    }

    /// Stops accepting work and waits up to `grace` for running jobs.
    ///
    /// Returns `true` when every worker drained and was joined. Workers still
    /// stuck in a job after `grace` are left detached.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.shared.lock().closed = true;
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let deadline = Instant::now() + grace;
        let mut state = self.shared.lock();
        while state.idle < self.size {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let drained = state.idle >= self.size;
        drop(state);

        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        if drained {
            for worker in workers {
                let _ = worker.join();
            }
        } else {
            warn!(
                busy = self.size - self.idle_workers(),
                "decode pool shut down with attempts still running"
            );
        }
        drained
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

fn worker_loop(shared: Arc<Shared>, jobs: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let next = jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = next else {
            break;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("decode attempt panicked");
        }
        let mut state = shared.lock();
        state.idle += 1;
        shared.changed.notify_all();
    }
}
