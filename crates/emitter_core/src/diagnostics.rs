//! # Listener Diagnostics
//!
//! Leak detection and per-emitter profiling.
//!
//! - [`Stacktrace`] records where a listener was subscribed. By default this
//!   is the `#[track_caller]` location of the subscribe call; full
//!   backtraces are captured only when enabled through
//!   [`crate::config::set_capture_backtraces`].
//! - [`LeakageMonitor`] counts outstanding subscriptions per call site once
//!   an emitter crosses its threshold and periodically reports the most
//!   frequent one.
//! - [`EventProfiling`] times every fire of an opted-in emitter and keeps the
//!   results in a process-wide registry.

use crate::config;
use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Where a listener was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stacktrace {
    value: Arc<str>,
}

impl Stacktrace {
    pub fn capture(caller: &'static Location<'static>) -> Self {
        let value = if config::capture_backtraces() {
            format!("{}\n{:?}", caller, backtrace::Backtrace::new())
        } else {
            caller.to_string()
        };
        Self { value: value.into() }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn print(&self) {
        warn!("{}", self.value);
    }
}

/// Removes one recorded subscription from a [`LeakageMonitor`].
pub(crate) type LeakRemoval = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct LeakState {
    stacks: HashMap<Arc<str>, usize>,
    warn_countdown: i64,
}

/// Tracks outstanding subscriptions once an emitter holds `threshold`
/// listeners.
pub struct LeakageMonitor {
    threshold: i64,
    name: String,
    state: Arc<Mutex<LeakState>>,
}

impl LeakageMonitor {
    pub fn new(threshold: i64, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().simple().to_string();
            id[..3].to_string()
        });
        Self {
            threshold,
            name,
            state: Arc::new(Mutex::new(LeakState::default())),
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records a subscription made from `stack` while the emitter holds
    /// `listener_count` listeners.
    ///
    /// Returns the action that forgets the subscription again, or `None` when
    /// the emitter is still under its threshold.
    pub(crate) fn check(&self, stack: &Stacktrace, listener_count: usize) -> Option<LeakRemoval> {
        let threshold = self.threshold;
        if threshold <= 0 || (listener_count as i64) < threshold {
            return None;
        }

        let report = {
            let mut state = self.state.lock();
            *state.stacks.entry(Arc::clone(&stack.value)).or_insert(0) += 1;
            state.warn_countdown -= 1;
            if state.warn_countdown <= 0 {
                state.warn_countdown = (threshold + 1) / 2;
                Self::most_frequent_in(&state)
            } else {
                None
            }
        };

        if let Some((top_stack, top_count)) = report {
            warn!(
                "⚠️ [{}] potential listener LEAK detected, having {} listeners already. MOST frequent listener ({}):\n{}",
                self.name, listener_count, top_count, top_stack
            );
        }

        let state = Arc::clone(&self.state);
        let key = Arc::clone(&stack.value);
        Some(Box::new(move || {
            let mut state = state.lock();
            if let Some(count) = state.stacks.get_mut(&key) {
                *count = count.saturating_sub(1);
            }
        }))
    }

    /// The call site with the most outstanding subscriptions.
    pub fn most_frequent(&self) -> Option<(String, usize)> {
        Self::most_frequent_in(&self.state.lock())
    }

    fn most_frequent_in(state: &LeakState) -> Option<(String, usize)> {
        let mut top: Option<(&Arc<str>, usize)> = None;
        for (stack, &count) in &state.stacks {
            if top.map_or(true, |(_, best)| count > best) {
                top = Some((stack, count));
            }
        }
        top.map(|(stack, count)| (stack.to_string(), count))
    }

    pub fn dispose(&self) {
        self.state.lock().stacks.clear();
    }
}

/// Timing figures collected for one profiled emitter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilingStats {
    pub listener_count: usize,
    pub invocation_count: u64,
    pub elapsed_overall: Duration,
    pub durations: Vec<Duration>,
}

lazy_static! {
    static ref PROFILES: DashMap<String, Arc<EventProfiling>> = DashMap::new();
}

static PROFILE_ID_POOL: AtomicU64 = AtomicU64::new(0);

/// Per-emitter fire timing.
pub struct EventProfiling {
    name: String,
    stats: Mutex<ProfilingStats>,
    stopwatch: Mutex<Option<Instant>>,
}

impl EventProfiling {
    /// Creates a profile named `<name>_<n>` and adds it to the registry.
    pub fn register(name: &str) -> Arc<Self> {
        let name = format!("{}_{}", name, PROFILE_ID_POOL.fetch_add(1, Ordering::Relaxed));
        let profile = Arc::new(Self {
            name: name.clone(),
            stats: Mutex::new(ProfilingStats::default()),
            stopwatch: Mutex::new(None),
        });
        PROFILES.insert(name, Arc::clone(&profile));
        profile
    }

    /// Every profile registered in this process.
    pub fn all() -> Vec<Arc<EventProfiling>> {
        PROFILES.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn get(name: &str) -> Option<Arc<EventProfiling>> {
        PROFILES.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self, listener_count: usize) {
        *self.stopwatch.lock() = Some(Instant::now());
        self.stats.lock().listener_count = listener_count;
    }

    pub fn stop(&self) {
        let Some(started) = self.stopwatch.lock().take() else {
            return;
        };
        let elapsed = started.elapsed();
        let mut stats = self.stats.lock();
        stats.durations.push(elapsed);
        stats.elapsed_overall += elapsed;
        stats.invocation_count += 1;
    }

    pub fn stats(&self) -> ProfilingStats {
        self.stats.lock().clone()
    }
}
