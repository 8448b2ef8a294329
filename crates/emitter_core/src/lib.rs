//! # Emitter Core
//!
//! Typed, in-process publish/subscribe primitives: emitters that own an
//! ordered listener set, events that expose only the subscribe side, and a
//! library of combinators for deriving new events from existing ones.
//!
//! ## Core Features
//!
//! - **Type Safety**: every event carries one payload type, checked at compile time
//! - **Ordered Delivery**: listeners run in subscription order; nested fires
//!   drain through a delivery queue before the outer fire returns
//! - **Lifecycle Hooks**: emitters report first/last listener transitions so
//!   derived events attach upstream only while observed
//! - **Combinators**: map, filter, reduce, debounce, buffer, latch, chain and more
//! - **Async Delivery**: [`AsyncEmitter`] lets listeners delay the next one with futures
//! - **Leak Diagnostics**: per-emitter leak monitors, profiling and dispose warnings
//!
//! ## Architecture Overview
//!
//! - [`emitter`] - [`Emitter`], [`Event`], [`EmitterOptions`], [`EventDeliveryQueue`]
//! - [`combinators`] - functions deriving events from events
//! - [`async_emitter`] - sequential async delivery with `wait_until`
//! - [`pauseable`] - pause, debounce and microtask batching emitters
//! - [`forwarding`] - multiplexer, bufferer and relay
//! - [`lifecycle`] - [`Disposable`] and [`DisposableStore`]
//! - [`diagnostics`] - leak monitor, profiling, stack capture
//! - [`scheduler`] - timers and microtasks behind a trait
//! - [`config`], [`logging`], [`error`] - process-wide settings, tracing setup, errors
//!
//! ## Quick Start Example
//!
//! ```rust
//! use emitter_core::combinators;
//! use emitter_core::{Dispose, DisposableStore, Emitter};
//! use std::sync::{Arc, Mutex};
//!
//! let clicks: Emitter<(i32, i32)> = Emitter::new();
//! let store = DisposableStore::new();
//!
//! let on_left_half = combinators::filter(&clicks.event(), |(x, _): &(i32, i32)| *x < 0, Some(&store));
//! let xs = combinators::map(&on_left_half, |(x, _): &(i32, i32)| *x, Some(&store));
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! xs.subscribe_into(move |x: &i32| sink.lock().unwrap().push(*x), &store);
//!
//! clicks.fire((-3, 1));
//! clicks.fire((4, 1));
//! store.dispose();
//! clicks.fire((-1, 1));
//!
//! assert_eq!(*seen.lock().unwrap(), vec![-3]);
//! assert!(!clicks.has_listeners());
//! ```
//!
//! ## Sharing a Delivery Queue
//!
//! Emitters built with the same [`EventDeliveryQueue`] (see
//! [`EmitterOptions::delivery_queue`]) deliver in strict FIFO order across
//! all of them, even when listeners fire other emitters reentrantly.

mod linked_list;

#[cfg(test)]
mod test_integration;

pub mod async_emitter;
pub mod combinators;
pub mod config;
pub mod diagnostics;
pub mod emitter;
pub mod error;
pub mod forwarding;
pub mod lifecycle;
pub mod logging;
pub mod pauseable;
pub mod scheduler;

pub use async_emitter::{AsyncEmitter, PromiseJoin, WaitFuture, WaitUntilEvent};
pub use config::{
    enable_dispose_with_listeners_warning, global_leak_warning_threshold, set_capture_backtraces,
    set_global_leak_warning_threshold, set_snapshot_leak_warning, EventCoreConfig, LoggingSettings,
};
pub use diagnostics::{EventProfiling, LeakageMonitor, ProfilingStats, Stacktrace};
pub use emitter::{Callback, Emitter, EmitterOptions, Event, EventDeliveryQueue, Hook, Payload, WeakEmitter};
pub use error::{
    default_error_handler, on_unexpected_error, set_unexpected_error_handler, BoxError, ErrorHandler, EventError,
};
pub use forwarding::{EventBufferer, EventMultiplexer, Relay};
pub use lifecycle::{Disposable, DisposableCollector, DisposableStore, Dispose};
pub use logging::setup_logging;
pub use pauseable::{DebounceEmitter, MergeFn, MicrotaskEmitter, PauseableEmitter};
pub use scheduler::{ManualScheduler, Scheduler, SharedScheduler, Task, TimerHandle, TokioScheduler};

// Commonly needed alongside `AsyncEmitter`
pub use tokio_util::sync::CancellationToken;
