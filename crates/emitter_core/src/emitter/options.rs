use super::{Emitter, Payload};
use super::delivery::EventDeliveryQueue;
use crate::error::ErrorHandler;
use std::fmt;
use std::sync::Arc;

/// Lifecycle hook invoked with the emitter whose listener set changed.
pub type Hook<T> = Arc<dyn Fn(&Emitter<T>) + Send + Sync>;

/// Construction options for [`Emitter`].
///
/// All hooks run without any emitter lock held, so they may subscribe,
/// fire or dispose freely.
///
/// ```rust
/// use emitter_core::{Emitter, EmitterOptions};
///
/// let emitter: Emitter<u32> = Emitter::with_options(
///     EmitterOptions::new()
///         .on_will_add_first_listener(|_| println!("first listener arriving"))
///         .on_did_remove_last_listener(|_| println!("no listeners left"))
///         .leak_warning_threshold(50),
/// );
/// # drop(emitter);
/// ```
pub struct EmitterOptions<T: Payload> {
    pub(crate) on_will_add_first_listener: Option<Hook<T>>,
    pub(crate) on_did_add_first_listener: Option<Hook<T>>,
    pub(crate) on_did_add_listener: Option<Hook<T>>,
    pub(crate) on_will_remove_listener: Option<Hook<T>>,
    pub(crate) on_did_remove_last_listener: Option<Hook<T>>,
    pub(crate) on_listener_error: Option<ErrorHandler>,
    pub(crate) leak_warning_threshold: Option<i64>,
    pub(crate) delivery_queue: Option<Arc<EventDeliveryQueue>>,
    pub(crate) profiling_name: Option<String>,
    pub(crate) debug_name: Option<String>,
}

impl<T: Payload> EmitterOptions<T> {
    pub fn new() -> Self {
        Self {
            on_will_add_first_listener: None,
            on_did_add_first_listener: None,
            on_did_add_listener: None,
            on_will_remove_listener: None,
            on_did_remove_last_listener: None,
            on_listener_error: None,
            leak_warning_threshold: None,
            delivery_queue: None,
            profiling_name: None,
            debug_name: None,
        }
    }

    /// Runs before the first listener is added.
    pub fn on_will_add_first_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Emitter<T>) + Send + Sync + 'static,
    {
        self.on_will_add_first_listener = Some(Arc::new(hook));
        self
    }

    /// Runs after the first listener was added.
    pub fn on_did_add_first_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Emitter<T>) + Send + Sync + 'static,
    {
        self.on_did_add_first_listener = Some(Arc::new(hook));
        self
    }

    /// Runs after every added listener.
    pub fn on_did_add_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Emitter<T>) + Send + Sync + 'static,
    {
        self.on_did_add_listener = Some(Arc::new(hook));
        self
    }

    /// Runs before a listener is removed by disposing its subscription.
    pub fn on_will_remove_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Emitter<T>) + Send + Sync + 'static,
    {
        self.on_will_remove_listener = Some(Arc::new(hook));
        self
    }

    /// Runs once the listener set becomes empty, including when the emitter
    /// is disposed while listeners remain.
    pub fn on_did_remove_last_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Emitter<T>) + Send + Sync + 'static,
    {
        self.on_did_remove_last_listener = Some(Arc::new(hook));
        self
    }

    /// Receives listener panics from the emitter's private delivery queue.
    /// Ignored when a shared queue is configured; that queue's handler wins.
    pub fn on_listener_error(mut self, handler: ErrorHandler) -> Self {
        self.on_listener_error = Some(handler);
        self
    }

    /// Overrides the global leak warning threshold.
    pub fn leak_warning_threshold(mut self, threshold: i64) -> Self {
        self.leak_warning_threshold = Some(threshold);
        self
    }

    pub fn delivery_queue(mut self, queue: Arc<EventDeliveryQueue>) -> Self {
        self.delivery_queue = Some(queue);
        self
    }

    /// Records fire timings under `name` in the profiling registry.
    pub fn profiling_name(mut self, name: impl Into<String>) -> Self {
        self.profiling_name = Some(name.into());
        self
    }

    /// Name used in leak reports.
    pub fn debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    /// Chains `hook` after any `on_did_add_listener` already configured.
    pub(crate) fn also_on_did_add_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Emitter<T>) + Send + Sync + 'static,
    {
        let previous = self.on_did_add_listener.take();
        self.on_did_add_listener = Some(Arc::new(move |emitter: &Emitter<T>| {
            hook(emitter);
            if let Some(previous) = &previous {
                previous(emitter);
            }
        }));
        self
    }
}

impl<T: Payload> Default for EmitterOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Clone for EmitterOptions<T> {
    fn clone(&self) -> Self {
        Self {
            on_will_add_first_listener: self.on_will_add_first_listener.clone(),
            on_did_add_first_listener: self.on_did_add_first_listener.clone(),
            on_did_add_listener: self.on_did_add_listener.clone(),
            on_will_remove_listener: self.on_will_remove_listener.clone(),
            on_did_remove_last_listener: self.on_did_remove_last_listener.clone(),
            on_listener_error: self.on_listener_error.clone(),
            leak_warning_threshold: self.leak_warning_threshold,
            delivery_queue: self.delivery_queue.clone(),
            profiling_name: self.profiling_name.clone(),
            debug_name: self.debug_name.clone(),
        }
    }
}

impl<T: Payload> fmt::Debug for EmitterOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterOptions")
            .field("leak_warning_threshold", &self.leak_warning_threshold)
            .field("shared_queue", &self.delivery_queue.is_some())
            .field("profiling_name", &self.profiling_name)
            .field("debug_name", &self.debug_name)
            .finish()
    }
}
