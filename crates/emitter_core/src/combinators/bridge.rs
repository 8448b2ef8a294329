//! Adapters from foreign listener registries and observables.

use super::Sink;
use crate::emitter::{Callback, Emitter, EmitterOptions, Event, Payload, WeakEmitter};
use crate::lifecycle::{Disposable, DisposableStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// A registry in the `on` / `removeListener` style.
///
/// Listeners are identified by pointer (`Arc::ptr_eq`).
pub trait NodeEventEmitter<A>: Send + Sync {
    fn on(&self, event_name: &str, listener: Sink<A>);
    fn remove_listener(&self, event_name: &str, listener: &Sink<A>);
}

/// A registry in the `addEventListener` / `removeEventListener` style.
///
/// Listeners are identified by pointer (`Arc::ptr_eq`).
pub trait DomEventEmitter<A>: Send + Sync {
    fn add_event_listener(&self, event_name: &str, listener: Sink<A>);
    fn remove_event_listener(&self, event_name: &str, listener: &Sink<A>);
}

/// Wraps a foreign listener registry. The registry sees one listener while
/// the returned event has listeners, and none otherwise.
fn from_registration<A, T, R, U, M>(register: R, unregister: U, map: M) -> Event<T>
where
    A: 'static,
    T: Payload,
    R: Fn(Sink<A>) + Send + Sync + 'static,
    U: Fn(&Sink<A>) + Send + Sync + 'static,
    M: Fn(A) -> T + Send + Sync + 'static,
{
    let handler: Arc<Mutex<Option<Sink<A>>>> = Arc::new(Mutex::new(None));
    let registered = Arc::clone(&handler);
    let map = Arc::new(map);

    let emitter = Emitter::with_options(
        EmitterOptions::new()
            .on_will_add_first_listener(move |emitter: &Emitter<T>| {
                let target = emitter.downgrade();
                let map = Arc::clone(&map);
                let sink: Sink<A> = Arc::new(move |args: A| target.fire(map(args)));
                *registered.lock() = Some(Arc::clone(&sink));
                register(sink);
            })
            .on_did_remove_last_listener(move |_| {
                let sink = handler.lock().take();
                if let Some(sink) = sink {
                    unregister(&sink);
                }
            }),
    );
    emitter.event()
}

/// Adapts a node-style emitter's `event_name` into an [`Event`].
pub fn from_node_event_emitter<A, T, E, M>(emitter: Arc<E>, event_name: &str, map: M) -> Event<T>
where
    A: 'static,
    T: Payload,
    E: NodeEventEmitter<A> + ?Sized + 'static,
    M: Fn(A) -> T + Send + Sync + 'static,
{
    let (name, remove_name) = (event_name.to_string(), event_name.to_string());
    let remover = Arc::clone(&emitter);
    from_registration(
        move |sink| emitter.on(&name, sink),
        move |sink| remover.remove_listener(&remove_name, sink),
        map,
    )
}

/// Adapts a DOM-style target's `event_name` into an [`Event`].
pub fn from_dom_event_emitter<A, T, E, M>(target: Arc<E>, event_name: &str, map: M) -> Event<T>
where
    A: 'static,
    T: Payload,
    E: DomEventEmitter<A> + ?Sized + 'static,
    M: Fn(A) -> T + Send + Sync + 'static,
{
    let (name, remove_name) = (event_name.to_string(), event_name.to_string());
    let remover = Arc::clone(&target);
    from_registration(
        move |sink| target.add_event_listener(&name, sink),
        move |sink| remover.remove_event_listener(&remove_name, sink),
        map,
    )
}

/// Receives change notifications from an [`Observable`].
///
/// Updates nest: `begin_update` / `end_update` bracket a transaction and
/// changes reported inside it are coalesced.
pub trait Observer: Send + Sync {
    fn begin_update(&self);
    fn end_update(&self);
    fn handle_possible_change(&self);
    fn handle_change(&self);
}

/// A value that notifies observers about changes.
pub trait Observable<T>: Send + Sync {
    fn get(&self) -> T;
    /// Makes the observable push pending possible changes to its observers.
    fn report_changes(&self);
    fn add_observer(&self, observer: Arc<dyn Observer>);
    fn remove_observer(&self, observer: &Arc<dyn Observer>);
}

struct EmitterObserver<T: Payload> {
    observable: Arc<dyn Observable<T>>,
    emitter: WeakEmitter<T>,
    counter: AtomicUsize,
    has_changed: AtomicBool,
}

impl<T: Payload> Observer for EmitterObserver<T> {
    fn begin_update(&self) {
        self.counter.fetch_add(1, Ordering::AcqRel);
    }

    fn end_update(&self) {
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| Some(count.saturating_sub(1)))
            .unwrap_or(0);
        if previous != 1 {
            return;
        }
        self.observable.report_changes();
        if self.has_changed.swap(false, Ordering::AcqRel) {
            self.emitter.fire(self.observable.get());
        }
    }

    fn handle_possible_change(&self) {}

    fn handle_change(&self) {
        self.has_changed.store(true, Ordering::Release);
    }
}

/// Fires the observable's current value once per outermost update
/// transaction that contained a change.
///
/// The observer is attached only while the event has listeners.
pub fn from_observable<T: Payload>(observable: Arc<dyn Observable<T>>, store: Option<&DisposableStore>) -> Event<T> {
    let observer: Arc<OnceLock<Arc<dyn Observer>>> = Arc::new(OnceLock::new());
    let (adding, removing) = (Arc::clone(&observer), Arc::clone(&observer));
    let (add_to, remove_from) = (Arc::clone(&observable), Arc::clone(&observable));

    let emitter = Emitter::with_options(
        EmitterOptions::new()
            .on_will_add_first_listener(move |_| {
                if let Some(observer) = adding.get() {
                    add_to.add_observer(Arc::clone(observer));
                }
            })
            .on_did_remove_last_listener(move |_| {
                if let Some(observer) = removing.get() {
                    remove_from.remove_observer(observer);
                }
            }),
    );

    let _ = observer.set(Arc::new(EmitterObserver {
        observable,
        emitter: emitter.downgrade(),
        counter: AtomicUsize::new(0),
        has_changed: AtomicBool::new(false),
    }));

    if let Some(store) = store {
        store.add(emitter.clone());
    }
    emitter.event()
}

struct SignalObserver<T> {
    observable: Arc<dyn Observable<T>>,
    listener: Callback<()>,
    count: AtomicUsize,
    did_change: AtomicBool,
}

impl<T: 'static> Observer for SignalObserver<T> {
    fn begin_update(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn end_update(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| Some(count.saturating_sub(1)))
            .unwrap_or(0);
        if previous != 1 {
            return;
        }
        self.observable.report_changes();
        if self.did_change.swap(false, Ordering::AcqRel) {
            (self.listener)(&());
        }
    }

    fn handle_possible_change(&self) {}

    fn handle_change(&self) {
        self.did_change.store(true, Ordering::Release);
    }
}

/// Per-listener variant of [`from_observable`] that signals without reading
/// the value and allocates no emitter.
pub fn from_observable_light<T: 'static>(observable: Arc<dyn Observable<T>>) -> Event<()> {
    Event::from_fn(move |listener: Callback<()>, _| {
        let observer: Arc<dyn Observer> = Arc::new(SignalObserver {
            observable: Arc::clone(&observable),
            listener,
            count: AtomicUsize::new(0),
            did_change: AtomicBool::new(false),
        });
        observable.add_observer(Arc::clone(&observer));
        let observable = Arc::clone(&observable);
        Disposable::new(move || observable.remove_observer(&observer))
    })
}
