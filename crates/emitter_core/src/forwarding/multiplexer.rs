use crate::combinators::Sink;
use crate::emitter::{Emitter, EmitterOptions, Event, Payload};
use crate::lifecycle::{Disposable, Dispose};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct Input<T: Payload> {
    id: u64,
    event: Event<T>,
    listener: Option<Disposable>,
}

struct MultiplexState<T: Payload> {
    hooked: bool,
    inputs: Vec<Input<T>>,
    next_id: u64,
    forward: Option<Sink<T>>,
}

impl<T: Payload> MultiplexState<T> {
    /// Parks `subscription` on input `id`. Hands it back when the input is
    /// gone or already hooked, so the caller can dispose it.
    fn store(&mut self, id: u64, subscription: Disposable) -> Option<Disposable> {
        match self.inputs.iter_mut().find(|input| input.id == id) {
            Some(input) if input.listener.is_none() => {
                input.listener = Some(subscription);
                None
            }
            _ => Some(subscription),
        }
    }
}

fn hook<T: Payload + Clone>(event: &Event<T>, forward: &Sink<T>) -> Disposable {
    let forward = Arc::clone(forward);
    event.subscribe(move |value: &T| forward(value.clone()))
}

/// Merges any number of input events into one output event.
///
/// Inputs can be added and removed at any time. They are subscribed only
/// while the output has listeners.
pub struct EventMultiplexer<T: Payload + Clone> {
    emitter: Emitter<T>,
    state: Arc<Mutex<MultiplexState<T>>>,
}

impl<T: Payload + Clone> EventMultiplexer<T> {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(MultiplexState {
            hooked: false,
            inputs: Vec::new(),
            next_id: 0,
            forward: None,
        }));

        let (hooking, unhooking) = (Arc::clone(&state), Arc::clone(&state));
        let emitter = Emitter::with_options(
            EmitterOptions::new()
                .on_will_add_first_listener(move |emitter: &Emitter<T>| {
                    let weak = emitter.downgrade();
                    let forward: Sink<T> = Arc::new(move |value| weak.fire(value));
                    let pending: Vec<(u64, Event<T>)> = {
                        let mut state = hooking.lock();
                        state.hooked = true;
                        state.forward = Some(Arc::clone(&forward));
                        state
                            .inputs
                            .iter()
                            .map(|input| (input.id, input.event.clone()))
                            .collect()
                    };
                    for (id, event) in pending {
                        let subscription = hook(&event, &forward);
                        let rejected = hooking.lock().store(id, subscription);
                        if let Some(rejected) = rejected {
                            rejected.dispose();
                        }
                    }
                })
                .on_did_remove_last_listener(move |_| {
                    let listeners: Vec<Disposable> = {
                        let mut state = unhooking.lock();
                        state.hooked = false;
                        state.forward = None;
                        state.inputs.iter_mut().filter_map(|input| input.listener.take()).collect()
                    };
                    for listener in listeners {
                        listener.dispose();
                    }
                }),
        );

        Self { emitter, state }
    }

    pub fn event(&self) -> Event<T> {
        self.emitter.event()
    }

    /// Adds an input. Disposing the returned handle removes it again.
    pub fn add(&self, event: Event<T>) -> Disposable {
        let (id, forward) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.inputs.push(Input {
                id,
                event: event.clone(),
                listener: None,
            });
            let forward = if state.hooked { state.forward.clone() } else { None };
            (id, forward)
        };

        if let Some(forward) = forward {
            let subscription = hook(&event, &forward);
            let rejected = self.state.lock().store(id, subscription);
            if let Some(rejected) = rejected {
                rejected.dispose();
            }
        }

        let state = Arc::clone(&self.state);
        Disposable::new(move || {
            let listener = {
                let mut state = state.lock();
                let Some(index) = state.inputs.iter().position(|input| input.id == id) else {
                    return;
                };
                state.inputs.remove(index).listener
            };
            if let Some(listener) = listener {
                listener.dispose();
            }
        })
    }

    /// Number of registered inputs.
    pub fn len(&self) -> usize {
        self.state.lock().inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Payload + Clone> Default for EventMultiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload + Clone> Dispose for EventMultiplexer<T> {
    fn dispose(&self) {
        self.emitter.dispose();
    }
}

impl<T: Payload + Clone> fmt::Debug for EventMultiplexer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventMultiplexer")
            .field("inputs", &state.inputs.len())
            .field("hooked", &state.hooked)
            .finish()
    }
}
