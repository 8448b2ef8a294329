//! Ordered delivery of fired values.
//!
//! Every fire enqueues one element per listener and then drains the queue.
//! Emitters that share a queue therefore deliver nested fires strictly after
//! the values already queued, which keeps delivery order FIFO across
//! reentrant fires.

use crate::error::{default_error_handler, panic_message, ErrorHandler, EventError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A single deferred listener invocation.
pub(crate) type Delivery = Box<dyn FnOnce() + Send + 'static>;

struct QueuedDelivery {
    emitter: u64,
    deliver: Delivery,
}

/// FIFO of pending listener invocations.
///
/// Create one and pass it to several emitters through
/// [`EmitterOptions::delivery_queue`](crate::EmitterOptions::delivery_queue)
/// to share ordering between them.
pub struct EventDeliveryQueue {
    queue: Mutex<VecDeque<QueuedDelivery>>,
    on_listener_error: ErrorHandler,
    private: bool,
}

impl EventDeliveryQueue {
    /// A shareable queue reporting listener panics to the unexpected-error
    /// handler.
    pub fn new() -> Self {
        Self::with_error_handler(default_error_handler())
    }

    pub fn with_error_handler(on_listener_error: ErrorHandler) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            on_listener_error,
            private: false,
        }
    }

    /// A queue owned by exactly one emitter.
    pub(crate) fn private(on_listener_error: ErrorHandler) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            on_listener_error,
            private: true,
        }
    }

    /// Number of pending invocations.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn push(&self, emitter: u64, deliver: Delivery) {
        self.queue.lock().push_back(QueuedDelivery { emitter, deliver });
    }

    /// Drops every pending invocation that belongs to `emitter`.
    pub(crate) fn clear(&self, emitter: u64) {
        let mut queue = self.queue.lock();
        if self.private {
            queue.clear();
        } else {
            queue.retain(|element| element.emitter != emitter);
        }
    }

    /// Runs pending invocations until the queue is empty.
    ///
    /// A panicking listener is reported to the error handler and delivery
    /// continues with the next element.
    pub fn deliver(&self) {
        loop {
            let Some(next) = self.queue.lock().pop_front() else {
                break;
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(next.deliver)) {
                let err = EventError::ListenerPanicked(panic_message(payload));
                (self.on_listener_error)(&err);
            }
        }
    }
}

impl Default for EventDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDeliveryQueue")
            .field("pending", &self.len())
            .field("private", &self.private)
            .finish()
    }
}
