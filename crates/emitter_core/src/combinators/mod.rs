//! # Event Combinators
//!
//! Functions that derive new events from existing ones.
//!
//! Every derived event is lazy: it is backed by a private [`Emitter`] that
//! subscribes upstream only when it gains its first listener and detaches
//! again when the last listener leaves. Creating a derived event that nobody
//! listens to costs nothing and leaks nothing.
//!
//! Functions that take `store: Option<&DisposableStore>` register the
//! backing emitter there, so disposing the store tears the derived event
//! down regardless of listeners.

mod bridge;
mod buffer;
mod chain;
mod debounce;


pub use bridge::{
    from_dom_event_emitter, from_node_event_emitter, from_observable, from_observable_light, DomEventEmitter,
    NodeEventEmitter, Observable, Observer,
};
pub use buffer::{buffer, BufferFlush};
pub use chain::{chain, ChainableEvent};
pub use debounce::{accumulate, debounce, defer, DebounceDelay, DebounceOptions};

use crate::config;
use crate::diagnostics::Stacktrace;
use crate::emitter::{Callback, Emitter, EmitterOptions, Event, Payload};
use crate::lifecycle::{Disposable, DisposableStore, Dispose};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::oneshot;
use tracing::warn;

/// Owned-value forwarding function.
pub type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Forwards owned values into `emitter` without keeping it alive.
pub(crate) fn forward_to<T: Payload>(emitter: &Emitter<T>) -> Sink<T> {
    let weak = emitter.downgrade();
    Arc::new(move |value| weak.fire(value))
}

/// Builds a lazily attached derived event.
///
/// `attach` is called with a sink into the backing emitter whenever the
/// derived event gains its first listener and must return the upstream
/// subscription, which is disposed when the last listener leaves.
#[track_caller]
pub(crate) fn snapshot<T, A>(attach: A, store: Option<&DisposableStore>) -> Event<T>
where
    T: Payload,
    A: Fn(Sink<T>) -> Disposable + Send + Sync + 'static,
{
    let upstream: Arc<Mutex<Option<Disposable>>> = Arc::new(Mutex::new(None));
    let attached = Arc::clone(&upstream);

    let options = EmitterOptions::new()
        .on_will_add_first_listener(move |emitter: &Emitter<T>| {
            let subscription = attach(forward_to(emitter));
            let previous = attached.lock().replace(subscription);
            if let Some(previous) = previous {
                previous.dispose();
            }
        })
        .on_did_remove_last_listener(move |_| {
            let subscription = upstream.lock().take();
            if let Some(subscription) = subscription {
                subscription.dispose();
            }
        });

    let emitter = Emitter::with_options(leak_traced(options, store, Location::caller()));
    if let Some(store) = store {
        store.add(emitter.clone());
    }
    emitter.event()
}

/// Adds the snapshot leak warning to derived events created without a
/// store while the diagnostic is enabled.
pub(crate) fn leak_traced<T: Payload>(
    options: EmitterOptions<T>,
    store: Option<&DisposableStore>,
    caller: &'static Location<'static>,
) -> EmitterOptions<T> {
    if store.is_some() || !config::snapshot_leak_warning_enabled() {
        return options;
    }
    let origin = Stacktrace::capture(caller);
    let listeners = AtomicUsize::new(0);
    options.also_on_did_add_listener(move |_| {
        if listeners.fetch_add(1, Ordering::Relaxed) + 1 == 2 {
            warn!("⚠️ Snapshotted event likely used publicly and should have been created with a DisposableStore. Created at:");
            origin.print();
        }
    })
}

/// Transforms every value with `f`.
#[track_caller]
pub fn map<I, O, F>(event: &Event<I>, f: F, store: Option<&DisposableStore>) -> Event<O>
where
    I: Payload,
    O: Payload,
    F: Fn(&I) -> O + Send + Sync + 'static,
{
    let event = event.clone();
    let f = Arc::new(f);
    snapshot(
        move |sink: Sink<O>| {
            let f = Arc::clone(&f);
            event.subscribe(move |value: &I| sink(f(value)))
        },
        store,
    )
}

/// Runs `each` for every value and passes the value through unchanged.
#[track_caller]
pub fn for_each<T, F>(event: &Event<T>, each: F, store: Option<&DisposableStore>) -> Event<T>
where
    T: Payload + Clone,
    F: Fn(&T) + Send + Sync + 'static,
{
    let event = event.clone();
    let each = Arc::new(each);
    snapshot(
        move |sink: Sink<T>| {
            let each = Arc::clone(&each);
            event.subscribe(move |value: &T| {
                each(value);
                sink(value.clone());
            })
        },
        store,
    )
}

/// Forwards only the values that satisfy `predicate`.
#[track_caller]
pub fn filter<T, P>(event: &Event<T>, predicate: P, store: Option<&DisposableStore>) -> Event<T>
where
    T: Payload + Clone,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let event = event.clone();
    let predicate = Arc::new(predicate);
    snapshot(
        move |sink: Sink<T>| {
            let predicate = Arc::clone(&predicate);
            event.subscribe(move |value: &T| {
                if predicate(value) {
                    sink(value.clone());
                }
            })
        },
        store,
    )
}

/// Folds every value into an accumulator and emits the new accumulator.
///
/// The accumulator persists across detach and reattach.
#[track_caller]
pub fn reduce<I, O, M>(event: &Event<I>, merge: M, initial: Option<O>, store: Option<&DisposableStore>) -> Event<O>
where
    I: Payload,
    O: Payload + Clone,
    M: Fn(Option<O>, &I) -> O + Send + Sync + 'static,
{
    let accumulator = Mutex::new(initial);
    map(
        event,
        move |value: &I| {
            let last = accumulator.lock().take();
            let next = merge(last, value);
            *accumulator.lock() = Some(next.clone());
            next
        },
        store,
    )
}

/// Suppresses consecutive values that `equals` considers the same. The first
/// value always passes.
#[track_caller]
pub fn latch_by<T, E>(event: &Event<T>, equals: E, store: Option<&DisposableStore>) -> Event<T>
where
    T: Payload + Clone,
    E: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    let cache: Mutex<Option<T>> = Mutex::new(None);
    filter(
        event,
        move |value: &T| {
            let previous = cache.lock().replace(value.clone());
            match previous {
                Some(previous) => !equals(value, &previous),
                None => true,
            }
        },
        store,
    )
}

/// [`latch_by`] using `PartialEq`.
#[track_caller]
pub fn latch<T>(event: &Event<T>, store: Option<&DisposableStore>) -> Event<T>
where
    T: Payload + Clone + PartialEq,
{
    latch_by(event, |a: &T, b: &T| a == b, store)
}

/// Delivers at most one value per subscription, then unsubscribes itself.
pub fn once<T: Payload>(event: &Event<T>) -> Event<T> {
    let event = event.clone();
    Event::from_fn(move |listener: Callback<T>, caller| {
        let did_fire = Arc::new(AtomicBool::new(false));
        let handle: Arc<OnceLock<Disposable>> = Arc::new(OnceLock::new());

        let (fired, own_handle) = (Arc::clone(&did_fire), Arc::clone(&handle));
        let subscription = event.subscribe_callback(
            Arc::new(move |value: &T| {
                if fired.swap(true, Ordering::AcqRel) {
                    return;
                }
                if let Some(handle) = own_handle.get() {
                    handle.dispose();
                }
                listener(value);
            }),
            caller,
        );
        let _ = handle.set(subscription.clone());

        // fired synchronously while subscribing
        if did_fire.load(Ordering::Acquire) {
            subscription.dispose();
        }
        subscription
    })
}

/// Merges several events into one.
pub fn any<T: Payload>(events: &[Event<T>]) -> Event<T> {
    let events = events.to_vec();
    Event::from_fn(move |listener: Callback<T>, caller| {
        Disposable::combined(
            events
                .iter()
                .map(|event| event.subscribe_callback(Arc::clone(&listener), caller))
                .collect::<Vec<_>>(),
        )
    })
}

/// Splits an event into the values matching `predicate` and the rest.
#[track_caller]
pub fn split<T, P>(event: &Event<T>, predicate: P, store: Option<&DisposableStore>) -> (Event<T>, Event<T>)
where
    T: Payload + Clone,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    let matching = Arc::clone(&predicate);
    (
        filter(event, move |value: &T| matching(value), store),
        filter(event, move |value: &T| !predicate(value), store),
    )
}

/// Drops the payload.
pub fn signal<T: Payload>(event: &Event<T>) -> Event<()> {
    let event = event.clone();
    Event::from_fn(move |listener: Callback<()>, caller| {
        event.subscribe_callback(Arc::new(move |_: &T| listener(&())), caller)
    })
}

/// Resolves with the next value, or `None` if the source goes away first.
pub fn to_future<T: Payload + Clone>(event: &Event<T>) -> impl Future<Output = Option<T>> + Send + 'static {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let subscription = once(event).subscribe(move |value: &T| {
        let sender = tx.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(value.clone());
        }
    });
    async move {
        let value = rx.await.ok();
        subscription.dispose();
        value
    }
}

/// Calls `handler(None)` right away, then `handler(Some(value))` on every
/// fire.
pub fn run_and_subscribe<T, H>(event: &Event<T>, handler: H) -> Disposable
where
    T: Payload,
    H: Fn(Option<&T>) + Send + Sync + 'static,
{
    handler(None);
    event.subscribe(move |value: &T| handler(Some(value)))
}

/// Like [`run_and_subscribe`], handing every invocation a fresh store and
/// disposing the previous invocation's store first.
pub fn run_and_subscribe_with_store<T, H>(event: &Event<T>, handler: H) -> Disposable
where
    T: Payload,
    H: Fn(Option<&T>, &DisposableStore) + Send + Sync + 'static,
{
    let current: Arc<Mutex<Option<Arc<DisposableStore>>>> = Arc::new(Mutex::new(None));

    let scope = Arc::clone(&current);
    let run = move |value: Option<&T>| {
        let previous = scope.lock().take();
        if let Some(previous) = previous {
            previous.dispose();
        }
        let store = Arc::new(DisposableStore::new());
        *scope.lock() = Some(Arc::clone(&store));
        handler(value, &store);
    };

    run(None);
    let subscription = event.subscribe(move |value: &T| run(Some(value)));

    Disposable::new(move || {
        subscription.dispose();
        let last = current.lock().take();
        if let Some(last) = last {
            last.dispose();
        }
    })
}
