use super::leak_traced;
use crate::emitter::{Emitter, EmitterOptions, Event, Payload, WeakEmitter};
use crate::lifecycle::{Disposable, DisposableStore, Dispose};
use crate::scheduler::{SharedScheduler, TimerHandle};
use parking_lot::Mutex;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

/// When a debounced value is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDelay {
    /// After this much silence.
    After(Duration),
    /// On the next microtask.
    Microtask,
}

impl Default for DebounceDelay {
    fn default() -> Self {
        DebounceDelay::After(Duration::from_millis(100))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebounceOptions {
    pub delay: DebounceDelay,
    /// Forward the first value of a quiet window immediately.
    pub leading: bool,
    /// Deliver a pending value before a listener detaches.
    pub flush_on_listener_remove: bool,
    pub leak_warning_threshold: Option<i64>,
}

enum Pending {
    Timer(TimerHandle),
    Microtask,
}

struct DebounceState<O> {
    subscription: Option<Disposable>,
    output: Option<O>,
    pending: Option<Pending>,
    num_debounced_calls: usize,
}

struct Debouncer<O> {
    state: Mutex<DebounceState<O>>,
    delay: DebounceDelay,
    leading: bool,
    scheduler: SharedScheduler,
}

impl<O: Payload> Debouncer<O> {
    fn accept<I>(self: &Arc<Self>, emitter: &WeakEmitter<O>, merge: &(dyn Fn(Option<O>, &I) -> O + Send + Sync), value: &I) {
        let last = {
            let mut state = self.state.lock();
            state.num_debounced_calls += 1;
            state.output.take()
        };
        let merged = merge(last, value);

        let leading_value = {
            let mut state = self.state.lock();
            if self.leading && state.pending.is_none() {
                Some(merged)
            } else {
                state.output = Some(merged);
                None
            }
        };
        if let Some(value) = leading_value {
            emitter.fire(value);
        }

        let mut state = self.state.lock();
        match self.delay {
            DebounceDelay::After(delay) => {
                if let Some(Pending::Timer(timer)) = state.pending.take() {
                    timer.cancel();
                }
                let (this, target) = (Arc::clone(self), emitter.clone());
                let timer = self.scheduler.schedule_timer(delay, Box::new(move || this.flush(&target)));
                state.pending = Some(Pending::Timer(timer));
            }
            DebounceDelay::Microtask => {
                if state.pending.is_none() {
                    state.pending = Some(Pending::Microtask);
                    let (this, target) = (Arc::clone(self), emitter.clone());
                    self.scheduler.schedule_microtask(Box::new(move || this.flush(&target)));
                }
            }
        }
    }

    fn flush(&self, emitter: &WeakEmitter<O>) {
        let (output, should_fire) = {
            let mut state = self.state.lock();
            if let Some(Pending::Timer(timer)) = state.pending.take() {
                timer.cancel();
            }
            let should_fire = !self.leading || state.num_debounced_calls > 1;
            state.num_debounced_calls = 0;
            (state.output.take(), should_fire)
        };
        if !should_fire {
            return;
        }
        if let Some(value) = output {
            emitter.fire(value);
        }
    }

    fn has_pending_calls(&self) -> bool {
        self.state.lock().num_debounced_calls > 0
    }

    fn detach(&self) {
        let (subscription, pending) = {
            let mut state = self.state.lock();
            state.output = None;
            state.num_debounced_calls = 0;
            (state.subscription.take(), state.pending.take())
        };
        if let Some(Pending::Timer(timer)) = pending {
            timer.cancel();
        }
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
    }
}

/// Coalesces bursts of values into one.
///
/// Every upstream value is folded into an accumulator with `merge`. The
/// accumulator is delivered once the configured delay passes without a new
/// value. With `leading`, the first value of a quiet window is delivered
/// immediately and the trailing delivery only happens if more values arrived
/// in that window.
#[track_caller]
pub fn debounce<I, O, M>(
    event: &Event<I>,
    merge: M,
    scheduler: SharedScheduler,
    options: DebounceOptions,
    store: Option<&DisposableStore>,
) -> Event<O>
where
    I: Payload,
    O: Payload,
    M: Fn(Option<O>, &I) -> O + Send + Sync + 'static,
{
    let debouncer = Arc::new(Debouncer {
        state: Mutex::new(DebounceState {
            subscription: None,
            output: None,
            pending: None,
            num_debounced_calls: 0,
        }),
        delay: options.delay,
        leading: options.leading,
        scheduler,
    });
    let merge: Arc<dyn Fn(Option<O>, &I) -> O + Send + Sync> = Arc::new(merge);
    let source = event.clone();

    let attach = Arc::clone(&debouncer);
    let removing = Arc::clone(&debouncer);
    let flush_on_remove = options.flush_on_listener_remove;
    let mut emitter_options = EmitterOptions::new()
        .on_will_add_first_listener(move |emitter: &Emitter<O>| {
            let (core, target, merge) = (Arc::clone(&attach), emitter.downgrade(), Arc::clone(&merge));
            let subscription = source.subscribe(move |value: &I| core.accept(&target, &*merge, value));
            let previous = attach.state.lock().subscription.replace(subscription);
            if let Some(previous) = previous {
                previous.dispose();
            }
        })
        .on_will_remove_listener(move |emitter: &Emitter<O>| {
            if flush_on_remove && removing.has_pending_calls() {
                removing.flush(&emitter.downgrade());
            }
        })
        .on_did_remove_last_listener(move |_| debouncer.detach());
    if let Some(threshold) = options.leak_warning_threshold {
        emitter_options = emitter_options.leak_warning_threshold(threshold);
    }

    let emitter = Emitter::with_options(leak_traced(emitter_options, store, Location::caller()));
    if let Some(store) = store {
        store.add(emitter.clone());
    }
    emitter.event()
}

/// Collects every value fired within `delay` into one `Vec`, flushing on
/// listener removal.
#[track_caller]
pub fn accumulate<T>(
    event: &Event<T>,
    delay: Duration,
    scheduler: SharedScheduler,
    store: Option<&DisposableStore>,
) -> Event<Vec<T>>
where
    T: Payload + Clone,
{
    debounce(
        event,
        |last: Option<Vec<T>>, value: &T| {
            let mut values = last.unwrap_or_default();
            values.push(value.clone());
            values
        },
        scheduler,
        DebounceOptions {
            delay: DebounceDelay::After(delay),
            leading: false,
            flush_on_listener_remove: true,
            leak_warning_threshold: None,
        },
        store,
    )
}

/// Collapses bursts into a single `()` signal on a zero-delay timer.
#[track_caller]
pub fn defer<T: Payload>(event: &Event<T>, scheduler: SharedScheduler, store: Option<&DisposableStore>) -> Event<()> {
    debounce(
        event,
        |_: Option<()>, _: &T| (),
        scheduler,
        DebounceOptions {
            delay: DebounceDelay::After(Duration::ZERO),
            leading: false,
            flush_on_listener_remove: true,
            leak_warning_threshold: None,
        },
        store,
    )
}
