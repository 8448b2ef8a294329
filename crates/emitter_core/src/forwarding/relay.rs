use crate::combinators::Sink;
use crate::emitter::{Emitter, EmitterOptions, Event, Payload};
use crate::lifecycle::{Disposable, Dispose};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct RelayState<T: Payload> {
    input: Event<T>,
    listener: Option<Disposable>,
    forward: Option<Sink<T>>,
}

fn attach<T: Payload + Clone>(input: &Event<T>, forward: Sink<T>) -> Disposable {
    input.subscribe(move |value: &T| forward(value.clone()))
}

/// Forwards from a replaceable input event.
///
/// Swapping the input while the relay has listeners moves the subscription
/// over immediately; without listeners it only records the new input.
pub struct Relay<T: Payload + Clone> {
    emitter: Emitter<T>,
    state: Arc<Mutex<RelayState<T>>>,
}

impl<T: Payload + Clone> Relay<T> {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(RelayState {
            input: Event::none(),
            listener: None,
            forward: None,
        }));

        let (listening, idle) = (Arc::clone(&state), Arc::clone(&state));
        let emitter = Emitter::with_options(
            EmitterOptions::new()
                .on_did_add_first_listener(move |emitter: &Emitter<T>| {
                    let weak = emitter.downgrade();
                    let forward: Sink<T> = Arc::new(move |value| weak.fire(value));
                    let input = {
                        let mut state = listening.lock();
                        state.forward = Some(Arc::clone(&forward));
                        state.input.clone()
                    };
                    let subscription = attach(&input, forward);
                    let previous = listening.lock().listener.replace(subscription);
                    if let Some(previous) = previous {
                        previous.dispose();
                    }
                })
                .on_did_remove_last_listener(move |_| {
                    let listener = {
                        let mut state = idle.lock();
                        state.forward = None;
                        state.listener.take()
                    };
                    if let Some(listener) = listener {
                        listener.dispose();
                    }
                }),
        );

        Self { emitter, state }
    }

    pub fn event(&self) -> Event<T> {
        self.emitter.event()
    }

    /// Replaces the input event.
    pub fn set_input(&self, input: Event<T>) {
        let (previous, forward) = {
            let mut state = self.state.lock();
            state.input = input.clone();
            (state.listener.take(), state.forward.clone())
        };
        if let Some(previous) = previous {
            previous.dispose();
        }
        if let Some(forward) = forward {
            let subscription = attach(&input, forward);
            let stale = self.state.lock().listener.replace(subscription);
            if let Some(stale) = stale {
                stale.dispose();
            }
        }
    }
}

impl<T: Payload + Clone> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload + Clone> Dispose for Relay<T> {
    fn dispose(&self) {
        let listener = self.state.lock().listener.take();
        if let Some(listener) = listener {
            listener.dispose();
        }
        self.emitter.dispose();
    }
}

impl<T: Payload + Clone> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Relay")
            .field("input", &state.input)
            .field("listening", &state.forward.is_some())
            .finish()
    }
}
