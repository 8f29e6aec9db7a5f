//! Bounded-wait worker threads.
//!
//! A [`BoundedWorker`] runs one caller-installed task on a private thread,
//! woken on demand. Owners (typically the audio callback) talk to it through
//! two bounded waits and never block past them:
//!
//! - [`WorkerHandle::try_acquire_for_run`]: is the worker idle, or does it
//!   become idle within 2x the timeout? On `false` the caller runs the work
//!   inline or skips it for this buffer.
//! - [`WorkerHandle::wait_for_completion`]: has the current task finished
//!   within 5x the timeout? On `false` the caller treats whatever the task was
//!   producing as stale.
//!
//! ```text
//! Stopped --start()--> Idle --request_run()--> Running --task done--> Idle
//!    ^                                                                  |
//!    +----------------------------- stop() ------------------------------+
//! ```
//!
//! A run request that arrives while the task is running is coalesced into a
//! single follow-up run; the task is never re-entered.

mod priority;

pub use priority::PriorityHint;

use crate::config::SchedPolicy;
use crate::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Work executed by a [`BoundedWorker`]. Failures are reported through the
/// task's own side channel; the worker only catches panics.
pub type Task = Box<dyn FnMut() + Send + 'static>;

/// Attempts made by `try_acquire_for_run`, each bounded by the timeout.
pub const ACQUIRE_ATTEMPTS: u32 = 2;

/// `wait_for_completion` waits at most this many timeouts.
pub const COMPLETION_FACTOR: u32 = 5;

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Idle,
    Running,
}

struct Control {
    state: WorkerState,
    /// A run was requested and has not started yet.
    pending: bool,
    /// Cleared by `stop()`; the loop exits once it observes `false`.
    run: bool,
    priority: Option<PriorityHint>,
}

impl Control {
    #[inline]
    fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle && !self.pending
    }

    #[inline]
    fn in_flight(&self) -> bool {
        self.state == WorkerState::Running || (self.pending && self.run)
    }
}

struct Shared {
    name: String,
    control: Mutex<Control>,
    /// Worker side: a run was requested or the worker should exit.
    wake: Condvar,
    /// Owner side: the worker went idle or stopped.
    idle: Condvar,
    task: Mutex<Option<Task>>,
    timeout_us: AtomicU64,
    completed: AtomicU64,
}

/// Cloneable owner-side view of a worker.
///
/// All methods take `&self`, so the audio thread, the GUI thread and other
/// workers can hold their own handle.
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Arc<Shared>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> WorkerState {
        self.shared.control.lock().state
    }

    /// Idle with nothing queued. Does not wait.
    pub fn is_idle(&self) -> bool {
        self.shared.control.lock().is_idle()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.shared.timeout_us.load(Ordering::Relaxed))
    }

    pub fn set_timeout(&self, timeout: Duration) {
        let us = timeout.as_micros().clamp(1, u64::MAX as u128) as u64;
        self.shared.timeout_us.store(us, Ordering::Relaxed);
    }

    /// Number of task executions finished since creation.
    pub fn completed_runs(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Wake the worker to run its task once. Never waits for the task.
    ///
    /// Returns `false` if the worker is stopped and the request was dropped.
    pub fn request_run(&self) -> bool {
        let mut control = self.shared.control.lock();
        if !control.run {
            return false;
        }
        control.pending = true;
        drop(control);
        self.shared.wake.notify_one();
        true
    }

    /// `try_acquire_for_run_within` with the configured timeout per attempt.
    pub fn try_acquire_for_run(&self) -> bool {
        self.try_acquire_for_run_within(self.timeout())
    }

    /// True if the worker is idle now or becomes idle within
    /// `ACQUIRE_ATTEMPTS` waits of `per_attempt` each.
    pub fn try_acquire_for_run_within(&self, per_attempt: Duration) -> bool {
        let mut control = self.shared.control.lock();
        for _ in 0..ACQUIRE_ATTEMPTS {
            if control.state == WorkerState::Stopped {
                return false;
            }
            if control.is_idle() {
                return true;
            }
            let _ = self.shared.idle.wait_for(&mut control, per_attempt);
        }
        control.is_idle()
    }

    /// `wait_for_completion_within` with `COMPLETION_FACTOR` timeouts.
    pub fn wait_for_completion(&self) -> bool {
        self.wait_for_completion_within(self.timeout() * COMPLETION_FACTOR)
    }

    /// True once no task is running or queued; false after `limit` elapses.
    pub fn wait_for_completion_within(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut control = self.shared.control.lock();
        while control.in_flight() {
            if self.shared.idle.wait_until(&mut control, deadline).timed_out() {
                return !control.in_flight();
            }
        }
        true
    }

    /// Best-effort scheduling hint, applied on the worker thread as soon as
    /// it exists. Failure is logged, never fatal.
    pub fn set_priority(&self, priority: u8, policy: SchedPolicy) {
        let mut control = self.shared.control.lock();
        control.priority = Some(PriorityHint::new(priority, policy));
        drop(control);
        self.shared.wake.notify_one();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Owner of a worker thread. Stops and joins on drop.
pub struct BoundedWorker {
    handle: WorkerHandle,
    thread: Option<JoinHandle<()>>,
}

impl BoundedWorker {
    /// Create a stopped worker without a task.
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        let handle = WorkerHandle {
            shared: Arc::new(Shared {
                name: name.into(),
                control: Mutex::new(Control {
                    state: WorkerState::Stopped,
                    pending: false,
                    run: false,
                    priority: None,
                }),
                wake: Condvar::new(),
                idle: Condvar::new(),
                task: Mutex::new(None),
                timeout_us: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        };
        handle.set_timeout(timeout);

        Self {
            handle,
            thread: None,
        }
    }

    /// Create a stopped worker with `task` installed.
    pub fn with_task(
        name: impl Into<String>,
        timeout: Duration,
        task: impl FnMut() + Send + 'static,
    ) -> Self {
        let mut worker = Self::new(name, timeout);
        worker.set_task(task);
        worker
    }

    /// Install the task. Meant for setup time; if the worker is mid-task this
    /// waits for that run to finish.
    pub fn set_task(&mut self, task: impl FnMut() + Send + 'static) {
        *self.handle.shared.task.lock() = Some(Box::new(task));
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn is_started(&self) -> bool {
        self.thread.is_some()
    }

    /// Spawn the thread. No-op if already started.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        {
            let mut control = self.handle.shared.control.lock();
            control.run = true;
            control.pending = false;
            control.state = WorkerState::Idle;
        }

        let shared = Arc::clone(&self.handle.shared);
        let spawned = thread::Builder::new()
            .name(self.handle.shared.name.clone())
            .spawn(move || worker_loop(shared));

        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                let mut control = self.handle.shared.control.lock();
                control.run = false;
                control.state = WorkerState::Stopped;
                Err(Error::WorkerSpawn(e))
            }
        }
    }

    /// Signal the loop to exit and join it. A running task is allowed to
    /// finish. No-op if already stopped.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.handle.shared.control.lock().run = false;
        self.handle.shared.wake.notify_all();

        if thread.join().is_err() {
            tracing::error!(worker = %self.handle.name(), "worker thread panicked");
        }

        let mut control = self.handle.shared.control.lock();
        control.state = WorkerState::Stopped;
        control.pending = false;
        drop(control);
        self.handle.shared.idle.notify_all();
    }

    /// Restart only if needed; fails if the task is missing.
    pub fn ensure_started(&mut self) -> Result<()> {
        if self.handle.shared.task.lock().is_none() {
            return Err(Error::WorkerRunning(format!(
                "{} has no task installed",
                self.handle.name()
            )));
        }
        self.start()
    }

    pub fn state(&self) -> WorkerState {
        self.handle.state()
    }

    pub fn request_run(&self) -> bool {
        self.handle.request_run()
    }

    pub fn try_acquire_for_run(&self) -> bool {
        self.handle.try_acquire_for_run()
    }

    pub fn wait_for_completion(&self) -> bool {
        self.handle.wait_for_completion()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.handle.set_timeout(timeout);
    }

    pub fn set_priority(&self, priority: u8, policy: SchedPolicy) {
        self.handle.set_priority(priority, policy);
    }
}

impl Drop for BoundedWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    tracing::debug!(worker = %shared.name, "worker started");

    let mut control = shared.control.lock();
    loop {
        if let Some(hint) = control.priority.take() {
            MutexGuard::unlocked(&mut control, || {
                if let Err(e) = priority::apply_to_current(hint) {
                    tracing::warn!(worker = %shared.name, "could not apply {:?}: {}", hint, e);
                }
            });
            continue;
        }

        if !control.run {
            break;
        }

        if !control.pending {
            shared.wake.wait(&mut control);
            continue;
        }

        control.pending = false;
        control.state = WorkerState::Running;

        MutexGuard::unlocked(&mut control, || {
            let mut task = shared.task.lock();
            if let Some(task) = task.as_mut() {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!(worker = %shared.name, "worker task panicked");
                }
            }
        });

        shared.completed.fetch_add(1, Ordering::Release);
        if !control.pending {
            control.state = WorkerState::Idle;
        }
        shared.idle.notify_all();
    }

    control.state = WorkerState::Stopped;
    control.pending = false;
    drop(control);
    shared.idle.notify_all();

    tracing::debug!(worker = %shared.name, "worker stopped");
}
