use super::{EmitterInner, Payload};
use crate::lifecycle::{Disposable, DisposableCollector};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Shared listener callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

type SubscribeFn<T> = dyn Fn(Callback<T>, &'static Location<'static>) -> Disposable + Send + Sync;

enum Source<T: Payload> {
    None,
    Emitter(Arc<EmitterInner<T>>),
    Custom(Arc<SubscribeFn<T>>),
}

/// Subscribe capability for values of type `T`.
///
/// An `Event` is what producers hand out: holders can listen but never fire.
/// It is cheap to clone and keeps its source alive.
pub struct Event<T: Payload> {
    source: Source<T>,
}

impl<T: Payload> Event<T> {
    /// An event that never fires. Subscribing returns an inert handle.
    pub fn none() -> Self {
        Self { source: Source::None }
    }

    /// Builds an event from a raw subscribe function.
    ///
    /// The function receives the listener and the location of the subscribe
    /// call, and returns the handle that detaches that listener.
    pub fn from_fn<F>(subscribe: F) -> Self
    where
        F: Fn(Callback<T>, &'static Location<'static>) -> Disposable + Send + Sync + 'static,
    {
        Self {
            source: Source::Custom(Arc::new(subscribe)),
        }
    }

    pub(crate) fn from_emitter(inner: Arc<EmitterInner<T>>) -> Self {
        Self {
            source: Source::Emitter(inner),
        }
    }

    /// Registers `listener`. Disposing the returned handle removes it.
    #[track_caller]
    pub fn subscribe<F>(&self, listener: F) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(listener), Location::caller())
    }

    /// Registers `listener` and also parks the handle in `collector`, so the
    /// subscription ends when the collecting scope is disposed.
    #[track_caller]
    pub fn subscribe_into<F, C>(&self, listener: F, collector: C) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
        C: DisposableCollector,
    {
        let subscription = self.subscribe_callback(Arc::new(listener), Location::caller());
        collector.collect(subscription.clone());
        subscription
    }

    /// Registers an already shared callback on behalf of `caller`.
    pub fn subscribe_callback(&self, callback: Callback<T>, caller: &'static Location<'static>) -> Disposable {
        match &self.source {
            Source::None => Disposable::none(),
            Source::Emitter(inner) => EmitterInner::subscribe(inner, callback, caller),
            Source::Custom(subscribe) => subscribe(callback, caller),
        }
    }
}

impl<T: Payload> Clone for Event<T> {
    fn clone(&self) -> Self {
        let source = match &self.source {
            Source::None => Source::None,
            Source::Emitter(inner) => Source::Emitter(Arc::clone(inner)),
            Source::Custom(subscribe) => Source::Custom(Arc::clone(subscribe)),
        };
        Self { source }
    }
}

impl<T: Payload> Default for Event<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T: Payload> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::None => "none",
            Source::Emitter(_) => "emitter",
            Source::Custom(_) => "custom",
        };
        f.debug_struct("Event").field("source", &kind).finish()
    }
}
