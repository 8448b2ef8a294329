//! # Batching Emitters
//!
//! Emitters that hold values back and release them later:
//!
//! - [`PauseableEmitter`] queues while paused and releases on the final
//!   `resume`, either merged into one value or one by one
//! - [`DebounceEmitter`] pauses itself for a fixed window on the first fire
//!   and releases the merged window when the timer elapses
//! - [`MicrotaskEmitter`] releases everything fired in the current
//!   synchronous run on the next microtask
//!
//! All three drop values fired while nobody is listening.

use crate::emitter::{Emitter, EmitterOptions, Event, Payload};
use crate::lifecycle::Dispose;
use crate::scheduler::{SharedScheduler, TimerHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Combines a batch of queued values into one.
pub type MergeFn<T> = Arc<dyn Fn(Vec<T>) -> T + Send + Sync>;

struct PauseState<T> {
    paused: usize,
    queue: VecDeque<T>,
}

/// Emitter that can be paused.
///
/// Pauses nest: values fired while paused are queued and released only when
/// every `pause` has been matched by a `resume`.
///
/// ```rust
/// use emitter_core::pauseable::PauseableEmitter;
/// use std::sync::Arc;
///
/// let emitter = PauseableEmitter::with_merge(Arc::new(|batch: Vec<u32>| -> u32 { batch.iter().sum() }));
/// let _listener = emitter.event().subscribe(|total: &u32| assert_eq!(*total, 6));
///
/// emitter.pause();
/// emitter.fire(1);
/// emitter.fire(2);
/// emitter.fire(3);
/// emitter.resume();
/// ```
pub struct PauseableEmitter<T: Payload> {
    emitter: Emitter<T>,
    state: Arc<Mutex<PauseState<T>>>,
    merge: Option<MergeFn<T>>,
}

impl<T: Payload> PauseableEmitter<T> {
    pub fn new() -> Self {
        Self::with_options(EmitterOptions::new(), None)
    }

    pub fn with_merge(merge: MergeFn<T>) -> Self {
        Self::with_options(EmitterOptions::new(), Some(merge))
    }

    pub fn with_options(options: EmitterOptions<T>, merge: Option<MergeFn<T>>) -> Self {
        Self {
            emitter: Emitter::with_options(options),
            state: Arc::new(Mutex::new(PauseState {
                paused: 0,
                queue: VecDeque::new(),
            })),
            merge,
        }
    }

    pub fn event(&self) -> Event<T> {
        self.emitter.event()
    }

    pub fn has_listeners(&self) -> bool {
        self.emitter.has_listeners()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused != 0
    }

    /// Number of values waiting for the final `resume`.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn pause(&self) {
        self.state.lock().paused += 1;
    }

    /// Undoes one `pause`. The last one releases the queue.
    ///
    /// Without a merge function values are released one by one, and a
    /// listener that pauses again stops the release; the rest stays queued.
    pub fn resume(&self) {
        let batch = {
            let mut state = self.state.lock();
            if state.paused == 0 {
                return;
            }
            state.paused -= 1;
            if state.paused != 0 {
                return;
            }
            match &self.merge {
                Some(_) if state.queue.is_empty() => return,
                Some(_) => Some(state.queue.drain(..).collect::<Vec<_>>()),
                None => None,
            }
        };

        if let (Some(batch), Some(merge)) = (batch, &self.merge) {
            self.emitter.fire(merge(batch));
            return;
        }

        loop {
            let next = {
                let mut state = self.state.lock();
                if state.paused != 0 {
                    break;
                }
                state.queue.pop_front()
            };
            match next {
                Some(value) => self.emitter.fire(value),
                None => break,
            }
        }
    }

    pub fn fire(&self, value: T) {
        if !self.emitter.has_listeners() {
            return;
        }
        let deliver = {
            let mut state = self.state.lock();
            if state.paused != 0 {
                state.queue.push_back(value);
                None
            } else {
                Some(value)
            }
        };
        if let Some(value) = deliver {
            self.emitter.fire(value);
        }
    }
}

impl<T: Payload> Clone for PauseableEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            emitter: self.emitter.clone(),
            state: Arc::clone(&self.state),
            merge: self.merge.clone(),
        }
    }
}

impl<T: Payload> Default for PauseableEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Dispose for PauseableEmitter<T> {
    fn dispose(&self) {
        self.state.lock().queue.clear();
        self.emitter.dispose();
    }
}

impl<T: Payload> fmt::Debug for PauseableEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PauseableEmitter")
            .field("paused", &state.paused)
            .field("queued", &state.queue.len())
            .field("merge", &self.merge.is_some())
            .finish()
    }
}

/// Emitter that collects a window of fires and delivers them merged.
///
/// The first fire of a window pauses the emitter and starts a timer; when it
/// elapses the window is resumed and released through the merge function.
pub struct DebounceEmitter<T: Payload> {
    pauseable: PauseableEmitter<T>,
    delay: Duration,
    scheduler: SharedScheduler,
    window: Arc<Mutex<Option<TimerHandle>>>,
}

impl<T: Payload> DebounceEmitter<T> {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

    pub fn new(merge: MergeFn<T>, scheduler: SharedScheduler) -> Self {
        Self::with_options(EmitterOptions::new(), merge, Self::DEFAULT_DELAY, scheduler)
    }

    pub fn with_options(options: EmitterOptions<T>, merge: MergeFn<T>, delay: Duration, scheduler: SharedScheduler) -> Self {
        Self {
            pauseable: PauseableEmitter::with_options(options, Some(merge)),
            delay,
            scheduler,
            window: Arc::new(Mutex::new(None)),
        }
    }

    pub fn event(&self) -> Event<T> {
        self.pauseable.event()
    }

    pub fn has_listeners(&self) -> bool {
        self.pauseable.has_listeners()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn fire(&self, value: T) {
        {
            let mut window = self.window.lock();
            if window.is_none() {
                self.pauseable.pause();
                let (pauseable, slot) = (self.pauseable.clone(), Arc::clone(&self.window));
                let timer = self.scheduler.schedule_timer(
                    self.delay,
                    Box::new(move || {
                        slot.lock().take();
                        pauseable.resume();
                    }),
                );
                *window = Some(timer);
            }
        }
        self.pauseable.fire(value);
    }
}

impl<T: Payload> Dispose for DebounceEmitter<T> {
    fn dispose(&self) {
        let window = self.window.lock().take();
        if let Some(timer) = window {
            timer.cancel();
        }
        self.pauseable.dispose();
    }
}

impl<T: Payload> fmt::Debug for DebounceEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceEmitter")
            .field("delay", &self.delay)
            .field("window_open", &self.window.lock().is_some())
            .field("inner", &self.pauseable)
            .finish()
    }
}

/// Emitter that delivers on the next microtask.
///
/// Everything fired before the microtask runs is delivered together, merged
/// when a merge function is set and in order otherwise.
pub struct MicrotaskEmitter<T: Payload> {
    emitter: Emitter<T>,
    queue: Arc<Mutex<Vec<T>>>,
    merge: Option<MergeFn<T>>,
    scheduler: SharedScheduler,
}

impl<T: Payload> MicrotaskEmitter<T> {
    pub fn new(scheduler: SharedScheduler) -> Self {
        Self::with_options(EmitterOptions::new(), None, scheduler)
    }

    pub fn with_options(options: EmitterOptions<T>, merge: Option<MergeFn<T>>, scheduler: SharedScheduler) -> Self {
        Self {
            emitter: Emitter::with_options(options),
            queue: Arc::new(Mutex::new(Vec::new())),
            merge,
            scheduler,
        }
    }

    pub fn event(&self) -> Event<T> {
        self.emitter.event()
    }

    pub fn has_listeners(&self) -> bool {
        self.emitter.has_listeners()
    }

    pub fn fire(&self, value: T) {
        if !self.emitter.has_listeners() {
            return;
        }
        let first = {
            let mut queue = self.queue.lock();
            queue.push(value);
            queue.len() == 1
        };
        if !first {
            return;
        }

        let (target, queue, merge) = (self.emitter.downgrade(), Arc::clone(&self.queue), self.merge.clone());
        self.scheduler.schedule_microtask(Box::new(move || {
            let batch = std::mem::take(&mut *queue.lock());
            if batch.is_empty() {
                return;
            }
            match merge {
                Some(merge) => target.fire(merge(batch)),
                None => {
                    for value in batch {
                        target.fire(value);
                    }
                }
            }
        }));
    }
}

impl<T: Payload> Dispose for MicrotaskEmitter<T> {
    fn dispose(&self) {
        self.queue.lock().clear();
        self.emitter.dispose();
    }
}

impl<T: Payload> fmt::Debug for MicrotaskEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskEmitter")
            .field("queued", &self.queue.lock().len())
            .field("merge", &self.merge.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Disposable;
    use crate::scheduler::ManualScheduler;
    use serial_test::parallel;

    fn record<T: Clone + Payload>(event: &Event<T>) -> (Arc<Mutex<Vec<T>>>, Disposable) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let subscription = event.subscribe(move |value: &T| sink.lock().push(value.clone()));
        (values, subscription)
    }

    fn sum() -> MergeFn<u32> {
        Arc::new(|batch: Vec<u32>| -> u32 { batch.iter().sum() })
    }

    #[test]
    #[parallel]
    fn test_pause_merges_queued_values() {
        let emitter = PauseableEmitter::with_merge(sum());
        let (values, _sub) = record(&emitter.event());

        emitter.pause();
        emitter.fire(1);
        emitter.fire(2);
        emitter.fire(3);
        assert!(values.lock().is_empty());
        emitter.resume();

        assert_eq!(*values.lock(), vec![6]);
        assert!(!emitter.is_paused());
    }

    #[test]
    #[parallel]
    fn test_resume_without_merge_delivers_each_value() {
        let emitter: PauseableEmitter<u32> = PauseableEmitter::new();
        let (values, _sub) = record(&emitter.event());

        emitter.pause();
        for n in 1..=3 {
            emitter.fire(n);
        }
        emitter.resume();

        assert_eq!(*values.lock(), vec![1, 2, 3]);
    }

    #[test]
    #[parallel]
    fn test_nested_pause_releases_on_outermost_resume() {
        let emitter = PauseableEmitter::with_merge(sum());
        let (values, _sub) = record(&emitter.event());

        emitter.pause();
        emitter.pause();
        emitter.fire(4);
        emitter.resume();
        assert!(values.lock().is_empty());
        emitter.resume();

        assert_eq!(*values.lock(), vec![4]);
    }

    #[test]
    #[parallel]
    fn test_resume_with_empty_queue_and_merge_fires_nothing() {
        let emitter = PauseableEmitter::with_merge(sum());
        let (values, _sub) = record(&emitter.event());

        emitter.pause();
        emitter.resume();
        emitter.resume();

        assert!(values.lock().is_empty());
    }

    #[test]
    #[parallel]
    fn test_listener_repausing_stops_release() {
        let emitter: PauseableEmitter<u32> = PauseableEmitter::new();
        let (values, _sub) = record(&emitter.event());
        let handle = emitter.clone();
        let _pauser = emitter.event().subscribe(move |n: &u32| {
            if *n == 2 {
                handle.pause();
            }
        });

        emitter.pause();
        for n in 1..=4 {
            emitter.fire(n);
        }
        emitter.resume();

        assert_eq!(*values.lock(), vec![1, 2]);
        assert_eq!(emitter.queued(), 2);

        emitter.resume();
        assert_eq!(*values.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    #[parallel]
    fn test_fire_without_listeners_is_dropped() {
        let emitter: PauseableEmitter<u32> = PauseableEmitter::new();
        emitter.pause();
        emitter.fire(1);
        assert_eq!(emitter.queued(), 0);

        let (values, _sub) = record(&emitter.event());
        emitter.resume();
        assert!(values.lock().is_empty());
    }

    #[test]
    #[parallel]
    fn test_debounce_emitter_merges_window() {
        let scheduler = ManualScheduler::new();
        let emitter = DebounceEmitter::new(sum(), scheduler.clone());
        assert_eq!(emitter.delay(), Duration::from_millis(100));
        let (values, _sub) = record(&emitter.event());

        emitter.fire(1);
        scheduler.advance(Duration::from_millis(50));
        emitter.fire(2);
        assert_eq!(scheduler.pending_timers(), 1);
        scheduler.advance(Duration::from_millis(50));
        assert_eq!(*values.lock(), vec![3]);

        emitter.fire(10);
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*values.lock(), vec![3, 10]);
    }

    #[test]
    #[parallel]
    fn test_debounce_emitter_dispose_cancels_window() {
        let scheduler = ManualScheduler::new();
        let emitter = DebounceEmitter::with_options(EmitterOptions::new(), sum(), Duration::from_millis(10), scheduler.clone());
        let (values, _sub) = record(&emitter.event());

        emitter.fire(1);
        emitter.dispose();
        assert_eq!(scheduler.pending_timers(), 0);
        scheduler.advance(Duration::from_millis(20));

        assert!(values.lock().is_empty());
    }

    #[test]
    #[parallel]
    fn test_microtask_emitter_delivers_in_order() {
        let scheduler = ManualScheduler::new();
        let emitter: MicrotaskEmitter<u32> = MicrotaskEmitter::new(scheduler.clone());
        let (values, _sub) = record(&emitter.event());

        emitter.fire(1);
        emitter.fire(2);
        assert!(values.lock().is_empty());
        assert_eq!(scheduler.pending_microtasks(), 1);

        scheduler.run_microtasks();
        assert_eq!(*values.lock(), vec![1, 2]);
    }

    #[test]
    #[parallel]
    fn test_microtask_emitter_merges() {
        let scheduler = ManualScheduler::new();
        let emitter = MicrotaskEmitter::with_options(EmitterOptions::new(), Some(sum()), scheduler.clone());
        let (values, _sub) = record(&emitter.event());

        emitter.fire(5);
        emitter.fire(6);
        scheduler.run_microtasks();
        emitter.fire(1);
        scheduler.run_microtasks();

        assert_eq!(*values.lock(), vec![11, 1]);
    }

    #[test]
    #[parallel]
    fn test_microtask_emitter_ignores_fire_without_listeners() {
        let scheduler = ManualScheduler::new();
        let emitter: MicrotaskEmitter<u32> = MicrotaskEmitter::new(scheduler.clone());
        emitter.fire(1);
        assert_eq!(scheduler.pending_microtasks(), 0);
    }

    #[test]
    #[parallel]
    fn test_microtask_emitter_keeps_values_fired_during_flush() {
        let scheduler = ManualScheduler::new();
        let emitter: Arc<MicrotaskEmitter<u32>> = Arc::new(MicrotaskEmitter::new(scheduler.clone()));
        let (values, _sub) = record(&emitter.event());
        let again = Arc::clone(&emitter);
        let _refire = emitter.event().subscribe(move |n: &u32| {
            if *n == 1 {
                again.fire(2);
            }
        });

        emitter.fire(1);
        scheduler.run_microtasks();

        assert_eq!(*values.lock(), vec![1, 2]);
    }
}
