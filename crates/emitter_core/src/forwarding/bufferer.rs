use crate::emitter::{Callback, Event, Payload};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Deferred = Box<dyn FnOnce() + Send>;

/// Holds back deliveries of wrapped events while a closure runs.
///
/// ```rust
/// use emitter_core::forwarding::EventBufferer;
/// use emitter_core::Emitter;
/// use std::sync::{Arc, Mutex};
///
/// let emitter: Emitter<u32> = Emitter::new();
/// let bufferer = EventBufferer::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let _listener = bufferer
///     .wrap_event(&emitter.event())
///     .subscribe(move |n: &u32| sink.lock().unwrap().push(*n));
///
/// bufferer.buffer_events(|| {
///     emitter.fire(1);
///     assert!(seen.lock().unwrap().is_empty());
/// });
/// assert_eq!(*seen.lock().unwrap(), vec![1]);
/// ```
#[derive(Clone, Default)]
pub struct EventBufferer {
    buffers: Arc<Mutex<Vec<Vec<Deferred>>>>,
}

impl EventBufferer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `event` so that its deliveries are deferred while
    /// [`EventBufferer::buffer_events`] is running.
    pub fn wrap_event<T: Payload + Clone>(&self, event: &Event<T>) -> Event<T> {
        let (event, buffers) = (event.clone(), Arc::clone(&self.buffers));
        Event::from_fn(move |listener: Callback<T>, caller| {
            let buffers = Arc::clone(&buffers);
            event.subscribe_callback(
                Arc::new(move |value: &T| {
                    let deferred = {
                        let mut buffers = buffers.lock();
                        match buffers.last_mut() {
                            Some(top) => {
                                let (listener, value) = (Arc::clone(&listener), value.clone());
                                top.push(Box::new(move || listener(&value)));
                                true
                            }
                            None => false,
                        }
                    };
                    if !deferred {
                        listener(value);
                    }
                }),
                caller,
            )
        })
    }

    /// Runs `f`, capturing every wrapped delivery it triggers, then flushes
    /// them in capture order.
    ///
    /// Calls nest; only the innermost buffer captures. If `f` panics its
    /// captured deliveries are dropped.
    pub fn buffer_events<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.buffers.lock().push(Vec::new());
        let frame = BufferFrame {
            buffers: self.buffers.as_ref(),
            finished: false,
        };
        let result = f();
        for flush in frame.finish() {
            flush();
        }
        result
    }

    /// Whether a `buffer_events` call is in progress.
    pub fn is_buffering(&self) -> bool {
        !self.buffers.lock().is_empty()
    }
}

/// Pops one buffer level, on unwind too.
struct BufferFrame<'a> {
    buffers: &'a Mutex<Vec<Vec<Deferred>>>,
    finished: bool,
}

impl BufferFrame<'_> {
    fn finish(mut self) -> Vec<Deferred> {
        self.finished = true;
        self.buffers.lock().pop().unwrap_or_default()
    }
}

impl Drop for BufferFrame<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let discarded = self.buffers.lock().pop();
            drop(discarded);
        }
    }
}

impl fmt::Debug for EventBufferer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBufferer")
            .field("depth", &self.buffers.lock().len())
            .finish()
    }
}
