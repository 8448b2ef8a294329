//! # Disposal Primitives
//!
//! Every subscription, emitter and derived event in this crate is torn down
//! explicitly. This module provides the pieces used for that:
//!
//! - [`Dispose`] - implemented by anything that owns teardown work
//! - [`Disposable`] - a cloneable handle to work that runs exactly once
//! - [`DisposableStore`] - a scope that owns many disposables and releases
//!   them together
//! - [`DisposableCollector`] - what `subscribe_into` accepts: a store or a
//!   plain `Vec<Disposable>`
//!
//! Disposing twice is always a silent no-op.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

type DisposeFn = Box<dyn FnOnce() + Send + 'static>;

/// Types that own teardown work.
pub trait Dispose {
    /// Releases the resources held by `self`. Must be idempotent.
    fn dispose(&self);
}

impl<D: Dispose + ?Sized> Dispose for Arc<D> {
    fn dispose(&self) {
        (**self).dispose()
    }
}

struct DisposableInner {
    work: Mutex<Option<DisposeFn>>,
    disposed: AtomicBool,
}

/// Handle to work that runs at most once.
///
/// Clones share the same underlying work; disposing any clone disposes all
/// of them.
#[derive(Clone)]
pub struct Disposable {
    inner: Option<Arc<DisposableInner>>,
}

impl Disposable {
    /// Wraps `work` so that it runs on the first call to [`Dispose::dispose`].
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Some(Arc::new(DisposableInner {
                work: Mutex::new(Some(Box::new(work))),
                disposed: AtomicBool::new(false),
            })),
        }
    }

    /// A handle with nothing to do.
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// Combines several handles into one that disposes all of them in order.
    pub fn combined<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Disposable>,
    {
        let items: Vec<Disposable> = items.into_iter().collect();
        Self::new(move || {
            for item in items {
                item.dispose();
            }
        })
    }

    /// Returns true once the work has run (or was detached). Always true for
    /// [`Disposable::none`].
    pub fn is_disposed(&self) -> bool {
        match &self.inner {
            Some(inner) => inner.disposed.load(Ordering::Acquire),
            None => true,
        }
    }

    /// Detaches the work without running it. Returns whether work was still
    /// attached.
    pub(crate) fn unset(&self) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        inner.work.lock().take();
        true
    }
}

impl Dispose for Disposable {
    fn dispose(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let work = inner.work.lock().take();
        if let Some(work) = work {
            work();
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct StoreState {
    disposed: bool,
    items: Vec<Box<dyn Dispose + Send + Sync>>,
}

/// A scope that exclusively owns the disposables added to it.
///
/// Entries are disposed once, in the order they were added, when the store
/// itself is disposed.
pub struct DisposableStore {
    state: Mutex<StoreState>,
}

impl DisposableStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                disposed: false,
                items: Vec::new(),
            }),
        }
    }

    /// Adds `item` to the store.
    ///
    /// If the store was already disposed the item is disposed right away,
    /// since nothing would ever release it otherwise.
    pub fn add<D>(&self, item: D)
    where
        D: Dispose + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            warn!("⚠️ Adding a disposable to a DisposableStore that has already been disposed, disposing it immediately");
            item.dispose();
            return;
        }
        state.items.push(Box::new(item));
    }

    /// Disposes every entry but keeps the store usable.
    pub fn clear(&self) {
        let items = std::mem::take(&mut self.state.lock().items);
        for item in items {
            item.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl Default for DisposableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispose for DisposableStore {
    fn dispose(&self) {
        let items = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.items)
        };
        for item in items {
            item.dispose();
        }
    }
}

impl fmt::Debug for DisposableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DisposableStore")
            .field("disposed", &state.disposed)
            .field("items", &state.items.len())
            .finish()
    }
}

/// Somewhere a subscription handle can be parked for later disposal.
pub trait DisposableCollector {
    fn collect(self, disposable: Disposable);
}

impl DisposableCollector for &DisposableStore {
    fn collect(self, disposable: Disposable) {
        self.add(disposable);
    }
}

impl DisposableCollector for &mut Vec<Disposable> {
    fn collect(self, disposable: Disposable) {
        self.push(disposable);
    }
}
