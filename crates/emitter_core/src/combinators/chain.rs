use super::{debounce, filter, for_each, latch, map, once, reduce, DebounceOptions};
use crate::emitter::{Event, Payload};
use crate::lifecycle::{Disposable, DisposableStore, Dispose};
use crate::scheduler::SharedScheduler;
use std::sync::Arc;

/// Fluent pipeline over an event.
///
/// Every stage registers its backing emitter in one shared store, so
/// disposing the chain tears down the whole pipeline at once.
///
/// ```rust
/// use emitter_core::combinators::chain;
/// use emitter_core::{Dispose, Emitter};
///
/// let source: Emitter<u32> = Emitter::new();
/// let doubled_evens = chain(&source.event())
///     .filter(|n| n % 2 == 0)
///     .map(|n| n * 2);
///
/// let _listener = doubled_evens.on(|n| println!("{n}"));
/// source.fire(4);
/// doubled_evens.dispose();
/// ```
pub struct ChainableEvent<T: Payload> {
    event: Event<T>,
    store: Arc<DisposableStore>,
}

/// Starts a pipeline on `event`.
pub fn chain<T: Payload>(event: &Event<T>) -> ChainableEvent<T> {
    ChainableEvent {
        event: event.clone(),
        store: Arc::new(DisposableStore::new()),
    }
}

impl<T: Payload> ChainableEvent<T> {
    fn then<O: Payload>(self, event: Event<O>) -> ChainableEvent<O> {
        ChainableEvent {
            event,
            store: self.store,
        }
    }

    /// The event at the end of the pipeline.
    pub fn event(&self) -> Event<T> {
        self.event.clone()
    }

    #[track_caller]
    pub fn map<O, F>(self, f: F) -> ChainableEvent<O>
    where
        O: Payload,
        F: Fn(&T) -> O + Send + Sync + 'static,
    {
        let next = map(&self.event, f, Some(&self.store));
        self.then(next)
    }

    #[track_caller]
    pub fn for_each<F>(self, each: F) -> ChainableEvent<T>
    where
        T: Clone,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let next = for_each(&self.event, each, Some(&self.store));
        self.then(next)
    }

    #[track_caller]
    pub fn filter<P>(self, predicate: P) -> ChainableEvent<T>
    where
        T: Clone,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let next = filter(&self.event, predicate, Some(&self.store));
        self.then(next)
    }

    #[track_caller]
    pub fn reduce<O, M>(self, merge: M, initial: Option<O>) -> ChainableEvent<O>
    where
        O: Payload + Clone,
        M: Fn(Option<O>, &T) -> O + Send + Sync + 'static,
    {
        let next = reduce(&self.event, merge, initial, Some(&self.store));
        self.then(next)
    }

    #[track_caller]
    pub fn latch(self) -> ChainableEvent<T>
    where
        T: Clone + PartialEq,
    {
        let next = latch(&self.event, Some(&self.store));
        self.then(next)
    }

    #[track_caller]
    pub fn debounce<O, M>(self, merge: M, scheduler: SharedScheduler, options: DebounceOptions) -> ChainableEvent<O>
    where
        O: Payload,
        M: Fn(Option<O>, &T) -> O + Send + Sync + 'static,
    {
        let next = debounce(&self.event, merge, scheduler, options, Some(&self.store));
        self.then(next)
    }

    /// Subscribes to the end of the pipeline.
    #[track_caller]
    pub fn on<F>(&self, listener: F) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.event.subscribe(listener)
    }

    /// Subscribes for the next value only.
    #[track_caller]
    pub fn once<F>(&self, listener: F) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        once(&self.event).subscribe(listener)
    }
}

impl<T: Payload> Dispose for ChainableEvent<T> {
    fn dispose(&self) {
        self.store.dispose();
    }
}
