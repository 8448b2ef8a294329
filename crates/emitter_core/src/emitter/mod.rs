//! # Emitter
//!
//! [`Emitter<T>`] owns an ordered set of listeners and delivers every fired
//! value to them through an [`EventDeliveryQueue`]. Consumers never see the
//! emitter itself, only the [`Event<T>`] it exposes.
//!
//! ## Delivery Model
//!
//! - Listeners run synchronously, in subscription order, before `fire`
//!   returns.
//! - Fires are enqueued then drained, so a listener that fires again sees its
//!   nested delivery complete before the outer fire returns. Emitters that
//!   share a queue deliver in strict FIFO order across all of them.
//! - A panicking listener is reported to the error handler and the remaining
//!   listeners still run.
//! - A listener disposed mid-fire still gets the value already queued for it.
//! - No lock is held while listeners or hooks run.
//!
//! ## Lifecycle Hooks
//!
//! [`EmitterOptions`] hooks fire when the listener set changes. Derived
//! events use them to attach to their upstream source only while they are
//! observed.

mod delivery;
mod event;
mod options;


pub use delivery::EventDeliveryQueue;
pub use event::{Callback, Event};
pub use options::{EmitterOptions, Hook};

use crate::config;
use crate::diagnostics::{EventProfiling, LeakageMonitor, Stacktrace};
use crate::error::default_error_handler;
use crate::lifecycle::{Disposable, Dispose};
use crate::linked_list::LinkedList;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{error, warn};

/// Values that can flow through an emitter.
pub trait Payload: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Payload for T {}

static EMITTER_IDS: AtomicU64 = AtomicU64::new(1);

/// A registered callback.
pub(crate) struct Listener<T> {
    id: u64,
    callback: Callback<T>,
    stack: Option<Stacktrace>,
    subscription: OnceLock<Disposable>,
}

impl<T> Listener<T> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn invoke(&self, value: &T) {
        (self.callback)(value);
    }

    fn unset_subscription(&self) -> bool {
        self.subscription.get().map_or(false, Disposable::unset)
    }
}

struct EmitterState<T> {
    listeners: LinkedList<Arc<Listener<T>>>,
    disposed: bool,
}

pub(crate) struct EmitterInner<T: Payload> {
    id: u64,
    options: EmitterOptions<T>,
    state: Mutex<EmitterState<T>>,
    next_listener: AtomicU64,
    leakage: Option<LeakageMonitor>,
    profiling: Option<Arc<EventProfiling>>,
    delivery_queue: OnceLock<Arc<EventDeliveryQueue>>,
}

impl<T: Payload> EmitterInner<T> {
    fn queue(&self) -> &Arc<EventDeliveryQueue> {
        self.delivery_queue.get_or_init(|| {
            let handler = self
                .options
                .on_listener_error
                .clone()
                .unwrap_or_else(default_error_handler);
            Arc::new(EventDeliveryQueue::private(handler))
        })
    }

    pub(crate) fn subscribe(
        this: &Arc<Self>,
        callback: Callback<T>,
        caller: &'static Location<'static>,
    ) -> Disposable {
        let emitter = Emitter {
            inner: Arc::clone(this),
        };

        let (first, listener_count) = {
            let state = this.state.lock();
            if state.disposed {
                return Disposable::none();
            }
            (state.listeners.is_empty(), state.listeners.len())
        };

        if let Some(monitor) = &this.leakage {
            if listener_count as i64 >= monitor.threshold() * 3 {
                error!(
                    "🛑 [{}] REFUSES to accept new listeners because it exceeded its threshold by far ({} vs {})",
                    monitor.name(),
                    listener_count,
                    monitor.threshold()
                );
                if let Some((stack, count)) = monitor.most_frequent() {
                    error!("🛑 [{}] most frequent listener ({}):\n{}", monitor.name(), count, stack);
                }
                return Disposable::none();
            }
        }

        if first {
            if let Some(hook) = &this.options.on_will_add_first_listener {
                hook(&emitter);
            }
        }

        let mut stack = None;
        let mut remove_monitor = None;
        if let Some(monitor) = &this.leakage {
            let count = this.state.lock().listeners.len();
            let tracking_floor = (monitor.threshold() as f64 * 0.2).ceil() as i64;
            if count as i64 >= tracking_floor {
                let captured = Stacktrace::capture(caller);
                remove_monitor = monitor.check(&captured, count + 1);
                stack = Some(captured);
            }
        }
        if stack.is_none() && config::dispose_warning_scheduler().is_some() {
            stack = Some(Stacktrace::capture(caller));
        }

        let listener = Arc::new(Listener {
            id: this.next_listener.fetch_add(1, Ordering::Relaxed),
            callback,
            stack,
            subscription: OnceLock::new(),
        });

        let key = {
            let mut state = this.state.lock();
            if state.disposed {
                drop(state);
                if let Some(remove) = remove_monitor {
                    remove();
                }
                return Disposable::none();
            }
            state.listeners.push(Arc::clone(&listener))
        };

        if first {
            if let Some(hook) = &this.options.on_did_add_first_listener {
                hook(&emitter);
            }
        }
        if let Some(hook) = &this.options.on_did_add_listener {
            hook(&emitter);
        }

        // Holds the emitter alive while the listener is attached.
        let inner = Arc::clone(this);
        let listener_id = listener.id;
        let subscription = Disposable::new(move || {
            if let Some(remove) = remove_monitor {
                remove();
            }
            if inner.state.lock().disposed {
                return;
            }
            let emitter = Emitter { inner };
            if let Some(hook) = &emitter.inner.options.on_will_remove_listener {
                hook(&emitter);
            }
            let (removed, now_empty) = {
                let mut state = emitter.inner.state.lock();
                let owned = state
                    .listeners
                    .get(key)
                    .is_some_and(|listener| listener.id == listener_id);
                if !owned {
                    return;
                }
                (state.listeners.remove(key), state.listeners.is_empty())
            };
            drop(removed);
            if now_empty {
                if let Some(hook) = &emitter.inner.options.on_did_remove_last_listener {
                    hook(&emitter);
                }
            }
        });
        let _ = listener.subscription.set(subscription.clone());
        subscription
    }
}

/// Producer side of an event.
///
/// Cloning yields another handle to the same emitter.
///
/// ```rust
/// use emitter_core::{Dispose, Emitter};
/// use std::sync::{Arc, Mutex};
///
/// let emitter = Emitter::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let subscription = emitter.event().subscribe(move |value: &u32| {
///     sink.lock().unwrap().push(*value);
/// });
///
/// emitter.fire(1);
/// subscription.dispose();
/// emitter.fire(2);
///
/// assert_eq!(*seen.lock().unwrap(), vec![1]);
/// ```
pub struct Emitter<T: Payload> {
    inner: Arc<EmitterInner<T>>,
}

impl<T: Payload> Emitter<T> {
    pub fn new() -> Self {
        Self::with_options(EmitterOptions::new())
    }

    pub fn with_options(options: EmitterOptions<T>) -> Self {
        let threshold = options
            .leak_warning_threshold
            .unwrap_or_else(config::global_leak_warning_threshold);
        let leakage = (threshold > 0).then(|| LeakageMonitor::new(threshold, options.debug_name.clone()));
        let profiling = options.profiling_name.as_deref().map(EventProfiling::register);

        let delivery_queue = OnceLock::new();
        if let Some(queue) = &options.delivery_queue {
            let _ = delivery_queue.set(Arc::clone(queue));
        }

        Self {
            inner: Arc::new(EmitterInner {
                id: EMITTER_IDS.fetch_add(1, Ordering::Relaxed),
                options,
                state: Mutex::new(EmitterState {
                    listeners: LinkedList::new(),
                    disposed: false,
                }),
                next_listener: AtomicU64::new(1),
                leakage,
                profiling,
                delivery_queue,
            }),
        }
    }

    /// The subscribe capability handed to consumers. Every call returns an
    /// event bound to this same emitter.
    pub fn event(&self) -> Event<T> {
        Event::from_emitter(Arc::clone(&self.inner))
    }

    /// Delivers `value` to every current listener before returning.
    ///
    /// Firing a disposed emitter, or one without listeners, does nothing.
    pub fn fire(&self, value: T) {
        let inner = &self.inner;
        let snapshot: SmallVec<[Arc<Listener<T>>; 4]> = {
            let state = inner.state.lock();
            if state.disposed || state.listeners.is_empty() {
                return;
            }
            state.listeners.iter().cloned().collect()
        };

        let queue = inner.queue();
        let value = Arc::new(value);
        for listener in snapshot {
            let value = Arc::clone(&value);
            queue.push(inner.id, Box::new(move || listener.invoke(&value)));
        }

        if let Some(profiling) = &inner.profiling {
            profiling.start(queue.len());
        }
        queue.deliver();
        if let Some(profiling) = &inner.profiling {
            profiling.stop();
        }
    }

    pub fn has_listeners(&self) -> bool {
        !self.inner.state.lock().listeners.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    pub fn downgrade(&self) -> WeakEmitter<T> {
        WeakEmitter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Leak monitor attached to this emitter, if leak tracking is enabled.
    pub fn leakage_monitor(&self) -> Option<&LeakageMonitor> {
        self.inner.leakage.as_ref()
    }

    pub fn profiling(&self) -> Option<&Arc<EventProfiling>> {
        self.inner.profiling.as_ref()
    }

    pub(crate) fn listeners_snapshot(&self) -> Vec<Arc<Listener<T>>> {
        let state = self.inner.state.lock();
        if state.disposed {
            return Vec::new();
        }
        state.listeners.iter().cloned().collect()
    }
}

impl<T: Payload> Dispose for Emitter<T> {
    fn dispose(&self) {
        let inner = &self.inner;
        let remaining = {
            let mut state = inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.listeners.take_all()
        };
        let had_listeners = !remaining.is_empty();

        if had_listeners {
            if let Some(scheduler) = config::dispose_warning_scheduler() {
                scheduler.schedule_microtask(Box::new(move || {
                    for listener in remaining {
                        if listener.unset_subscription() {
                            warn!("⚠️ Emitter disposed while a listener was still subscribed, it was registered at:");
                            if let Some(stack) = &listener.stack {
                                stack.print();
                            }
                        }
                    }
                }));
            }
        }

        if let Some(queue) = inner.delivery_queue.get() {
            queue.clear(inner.id);
        }

        if had_listeners {
            if let Some(hook) = &inner.options.on_did_remove_last_listener {
                hook(self);
            }
        }

        if let Some(monitor) = &inner.leakage {
            monitor.dispose();
        }
    }
}

impl<T: Payload> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Payload> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Emitter")
            .field("id", &self.inner.id)
            .field("listeners", &state.listeners.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Non-owning emitter handle for forwarding closures.
pub struct WeakEmitter<T: Payload> {
    inner: Weak<EmitterInner<T>>,
}

impl<T: Payload> WeakEmitter<T> {
    pub fn upgrade(&self) -> Option<Emitter<T>> {
        self.inner.upgrade().map(|inner| Emitter { inner })
    }

    /// Fires through the emitter if it is still alive.
    pub fn fire(&self, value: T) {
        if let Some(emitter) = self.upgrade() {
            emitter.fire(value);
        }
    }
}

impl<T: Payload> Clone for WeakEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}
