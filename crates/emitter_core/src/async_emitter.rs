//! # Async Emitter
//!
//! [`AsyncEmitter`] delivers an event to its listeners one at a time and lets
//! each listener hold up the next one by registering futures through
//! [`WaitUntilEvent::wait_until`].
//!
//! Registration must happen while the listener is running. Once it returns
//! the set of futures is frozen, awaited to completion, and only then is the
//! next listener invoked. Failures are reported through
//! [`on_unexpected_error`] and never abort the delivery.

use crate::emitter::{Emitter, EmitterOptions, Event, Listener, Payload};
use crate::error::{on_unexpected_error, panic_message, BoxError, EventError};
use crate::lifecycle::Dispose;
use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A future registered through [`WaitUntilEvent::wait_until`].
pub type WaitFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Wraps every registered future. Receives the future and the id of the
/// listener that registered it.
pub type PromiseJoin = Arc<dyn Fn(WaitFuture, u64) -> WaitFuture + Send + Sync>;

/// What an [`AsyncEmitter`] listener receives.
///
/// Dereferences to the fired data.
pub struct WaitUntilEvent<T> {
    data: Arc<T>,
    token: CancellationToken,
    thenables: Arc<Mutex<Option<Vec<WaitFuture>>>>,
    join: Option<PromiseJoin>,
    listener_id: u64,
}

impl<T> WaitUntilEvent<T> {
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Cancellation token of the delivery in progress.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Delays the next listener until `future` completes.
    ///
    /// Only valid while the listener is running; afterwards it fails with
    /// [`EventError::WaitUntilAfterDelivery`].
    pub fn wait_until<F>(&self, future: F) -> Result<(), EventError>
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.thenables.lock().is_none() {
            return Err(Self::after_delivery());
        }

        let mut future: WaitFuture = Box::pin(future);
        if let Some(join) = &self.join {
            future = join(future, self.listener_id);
        }

        match self.thenables.lock().as_mut() {
            Some(thenables) => {
                thenables.push(future);
                Ok(())
            }
            None => Err(Self::after_delivery()),
        }
    }

    fn after_delivery() -> EventError {
        let err = EventError::WaitUntilAfterDelivery;
        error!("🔴 {}", err);
        err
    }
}

impl<T> Deref for WaitUntilEvent<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> Clone for WaitUntilEvent<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            token: self.token.clone(),
            thenables: Arc::clone(&self.thenables),
            join: self.join.clone(),
            listener_id: self.listener_id,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for WaitUntilEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitUntilEvent")
            .field("data", &self.data)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

type QueuedListener<T> = (Arc<Listener<WaitUntilEvent<T>>>, Arc<T>);

/// Emitter whose listeners can make delivery wait on futures.
///
/// ```rust
/// use emitter_core::async_emitter::AsyncEmitter;
/// use emitter_core::error::BoxError;
/// use tokio_util::sync::CancellationToken;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # runtime.block_on(async {
/// let emitter: AsyncEmitter<String> = AsyncEmitter::new();
/// let _saving = emitter.event().subscribe(|e| {
///     let name = e.data().clone();
///     let _ = e.wait_until(async move {
///         println!("saving {name}");
///         Ok::<(), BoxError>(())
///     });
/// });
///
/// emitter.fire_async("notes.txt".to_string(), &CancellationToken::new()).await;
/// # });
/// ```
pub struct AsyncEmitter<T: Payload> {
    emitter: Emitter<WaitUntilEvent<T>>,
    queue: Arc<Mutex<VecDeque<QueuedListener<T>>>>,
}

impl<T: Payload> AsyncEmitter<T> {
    pub fn new() -> Self {
        Self::with_options(EmitterOptions::new())
    }

    pub fn with_options(options: EmitterOptions<WaitUntilEvent<T>>) -> Self {
        Self {
            emitter: Emitter::with_options(options),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn event(&self) -> Event<WaitUntilEvent<T>> {
        self.emitter.event()
    }

    pub fn has_listeners(&self) -> bool {
        self.emitter.has_listeners()
    }

    /// Delivers `data` to every current listener in turn, waiting for the
    /// futures each listener registers before moving to the next one.
    ///
    /// Once `token` is cancelled the listeners still queued are skipped.
    pub async fn fire_async(&self, data: T, token: &CancellationToken) {
        self.deliver(data, token, None).await
    }

    /// Like [`AsyncEmitter::fire_async`], passing every registered future
    /// through `join` first.
    pub async fn fire_async_with_join(&self, data: T, token: &CancellationToken, join: PromiseJoin) {
        self.deliver(data, token, Some(join)).await
    }

    async fn deliver(&self, data: T, token: &CancellationToken, join: Option<PromiseJoin>) {
        let listeners = self.emitter.listeners_snapshot();
        if listeners.is_empty() {
            return;
        }

        let data = Arc::new(data);
        self.queue
            .lock()
            .extend(listeners.into_iter().map(|listener| (listener, Arc::clone(&data))));

        loop {
            if token.is_cancelled() {
                debug!("🔧 Async delivery cancelled with {} listener(s) pending", self.queue.lock().len());
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some((listener, data)) = next else {
                break;
            };

            let thenables = Arc::new(Mutex::new(Some(Vec::new())));
            let event = WaitUntilEvent {
                data,
                token: token.clone(),
                thenables: Arc::clone(&thenables),
                join: join.clone(),
                listener_id: listener.id(),
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(&event)));
            let waiting = thenables.lock().take().unwrap_or_default();
            if let Err(payload) = outcome {
                on_unexpected_error(&EventError::ListenerPanicked(panic_message(payload)));
                continue;
            }

            for result in join_all(waiting).await {
                if let Err(err) = result {
                    on_unexpected_error(&EventError::ListenerFailed(err));
                }
            }
        }
    }
}

impl<T: Payload> Default for AsyncEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Dispose for AsyncEmitter<T> {
    fn dispose(&self) {
        self.queue.lock().clear();
        self.emitter.dispose();
    }
}

impl<T: Payload> fmt::Debug for AsyncEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEmitter")
            .field("listeners", &self.emitter.listener_count())
            .field("queued", &self.queue.lock().len())
            .finish()
    }
}
