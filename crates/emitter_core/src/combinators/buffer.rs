use super::forward_to;
use crate::emitter::{Emitter, EmitterOptions, Event, Payload};
use crate::lifecycle::{Disposable, Dispose};
use crate::scheduler::SharedScheduler;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// When buffered values are replayed to the first listener.
#[derive(Clone, Default)]
pub enum BufferFlush {
    /// Synchronously, as the first listener is added.
    #[default]
    Immediate,
    /// On a zero-delay timer after the first listener is added.
    AfterTimeout(SharedScheduler),
}

struct BufferState<T> {
    buffer: Option<VecDeque<T>>,
    listener: Option<Disposable>,
}

/// Holds values fired before anyone listens and replays them, oldest first,
/// to the first listener. Afterwards values pass straight through.
///
/// Unlike the other combinators this subscribes to `event` immediately,
/// otherwise there would be nothing to buffer.
pub fn buffer<T>(event: &Event<T>, flush: BufferFlush, preset: Vec<T>) -> Event<T>
where
    T: Payload + Clone,
{
    let state = Arc::new(Mutex::new(BufferState {
        buffer: Some(VecDeque::from(preset)),
        listener: None,
    }));

    let (source, attaching) = (event.clone(), Arc::clone(&state));
    let (flushing, detaching) = (Arc::clone(&state), Arc::clone(&state));
    let emitter = Emitter::with_options(
        EmitterOptions::new()
            .on_will_add_first_listener(move |emitter: &Emitter<T>| {
                if attaching.lock().listener.is_some() {
                    return;
                }
                let forward = forward_to(emitter);
                let subscription = source.subscribe(move |value: &T| forward(value.clone()));
                attaching.lock().listener = Some(subscription);
            })
            .on_did_add_first_listener(move |emitter: &Emitter<T>| {
                if flushing.lock().buffer.is_none() {
                    return;
                }
                match &flush {
                    BufferFlush::Immediate => replay(&flushing, emitter),
                    BufferFlush::AfterTimeout(scheduler) => {
                        let (state, target) = (Arc::clone(&flushing), emitter.downgrade());
                        scheduler.schedule_timer(
                            Duration::ZERO,
                            Box::new(move || {
                                if let Some(emitter) = target.upgrade() {
                                    replay(&state, &emitter);
                                }
                            }),
                        );
                    }
                }
            })
            .on_did_remove_last_listener(move |_| {
                let listener = detaching.lock().listener.take();
                if let Some(listener) = listener {
                    listener.dispose();
                }
            }),
    );

    let (buffering, target) = (Arc::clone(&state), emitter.downgrade());
    let initial = event.subscribe(move |value: &T| {
        let passthrough = {
            let mut state = buffering.lock();
            match state.buffer.as_mut() {
                Some(buffer) => {
                    buffer.push_back(value.clone());
                    false
                }
                None => true,
            }
        };
        if passthrough {
            target.fire(value.clone());
        }
    });
    state.lock().listener = Some(initial);

    emitter.event()
}

fn replay<T: Payload>(state: &Mutex<BufferState<T>>, emitter: &Emitter<T>) {
    loop {
        let next = state.lock().buffer.as_mut().and_then(VecDeque::pop_front);
        match next {
            Some(value) => emitter.fire(value),
            None => break,
        }
    }
    state.lock().buffer = None;
}
