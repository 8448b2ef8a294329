//! # Scheduling
//!
//! Deferred work in this crate (debounce timers, microtask flushes, deferred
//! buffer replay, dispose diagnostics) goes through the [`Scheduler`] trait
//! instead of a hard-wired runtime.
//!
//! - [`TokioScheduler`] runs tasks on a tokio runtime.
//! - [`ManualScheduler`] is a deterministic fake clock driven by the caller.

use crate::error::EventError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared scheduler handle as stored by emitters.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Source of microtask and timer scheduling.
pub trait Scheduler: Send + Sync {
    /// Runs `task` after the current synchronous work completes.
    fn schedule_microtask(&self, task: Task);

    /// Runs `task` once `delay` has elapsed.
    fn schedule_timer(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for a scheduled timer.
///
/// Dropping the handle leaves the timer running.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerHandle {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle whose timer cannot be cancelled.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Scheduler backed by a tokio runtime.
///
/// Microtasks are spawned tasks; timers are spawned `sleep`s aborted on
/// cancel.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime the caller is running on.
    pub fn current() -> Result<Self, EventError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| EventError::Runtime(e.to_string()))
    }

    pub fn shared(self) -> SharedScheduler {
        Arc::new(self)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_microtask(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }

    fn schedule_timer(&self, delay: Duration, task: Task) -> TimerHandle {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_timer: u64,
    microtasks: VecDeque<Task>,
    timers: BTreeMap<(Duration, u64), Task>,
}

/// Deterministic scheduler for tests.
///
/// Nothing runs until the owner calls [`ManualScheduler::run_microtasks`] or
/// [`ManualScheduler::advance`].
#[derive(Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Time elapsed on the fake clock.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending_microtasks(&self) -> usize {
        self.state.lock().microtasks.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Runs microtasks until the queue is empty, including ones scheduled
    /// while draining. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(task) = self.state.lock().microtasks.pop_front() else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Moves the clock forward by `by`, running every timer that falls due in
    /// deadline order. Microtasks are drained before the first timer and
    /// after each one. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = self.run_microtasks();
        loop {
            let due = {
                let mut state = self.state.lock();
                match state.timers.keys().next().copied() {
                    Some(key) if key.0 <= target => {
                        state.now = key.0;
                        state.timers.remove(&key)
                    }
                    _ => None,
                }
            };
            let Some(task) = due else {
                break;
            };
            task();
            ran += 1;
            ran += self.run_microtasks();
        }
        let mut state = self.state.lock();
        if state.now < target {
            state.now = target;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_microtask(&self, task: Task) {
        self.state.lock().microtasks.push_back(task);
    }

    fn schedule_timer(&self, delay: Duration, task: Task) -> TimerHandle {
        let key = {
            let mut state = self.state.lock();
            let key = (state.now + delay, state.next_timer);
            state.next_timer += 1;
            state.timers.insert(key, task);
            key
        };
        let state: Weak<Mutex<ManualState>> = Arc::downgrade(&self.state);
        TimerHandle::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().timers.remove(&key);
            }
        })
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("microtasks", &state.microtasks.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}
