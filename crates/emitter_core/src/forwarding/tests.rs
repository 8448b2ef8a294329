//! Tests for multiplexing, buffering and relaying

#[cfg(test)]
mod tests {
    use crate::forwarding::{EventBufferer, EventMultiplexer, Relay};
    use crate::lifecycle::{Disposable, Dispose};
    use crate::{Emitter, Event};
    use parking_lot::Mutex;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use serial_test::parallel;

    fn record<T: Clone + Send + Sync + 'static>(event: &Event<T>) -> (Arc<Mutex<Vec<T>>>, Disposable) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let subscription = event.subscribe(move |value: &T| sink.lock().push(value.clone()));
        (values, subscription)
    }

    #[test]
    #[parallel]
    fn test_multiplexer_hooks_lazily() {
        let a: Emitter<u32> = Emitter::new();
        let b: Emitter<u32> = Emitter::new();
        let multiplexer = EventMultiplexer::new();
        let _a = multiplexer.add(a.event());
        assert!(!a.has_listeners());

        let (values, sub) = record(&multiplexer.event());
        assert!(a.has_listeners());
        let _b = multiplexer.add(b.event());
        assert!(b.has_listeners());

        a.fire(1);
        b.fire(2);
        assert_eq!(*values.lock(), vec![1, 2]);

        sub.dispose();
        assert!(!a.has_listeners());
        assert!(!b.has_listeners());
        assert_eq!(multiplexer.len(), 2);
    }

    #[test]
    #[parallel]
    fn test_multiplexer_removing_input_unhooks_it() {
        let a: Emitter<u32> = Emitter::new();
        let b: Emitter<u32> = Emitter::new();
        let multiplexer = EventMultiplexer::new();
        let remove_a = multiplexer.add(a.event());
        let _b = multiplexer.add(b.event());

        let (values, _sub) = record(&multiplexer.event());
        remove_a.dispose();
        assert!(!a.has_listeners());
        assert_eq!(multiplexer.len(), 1);

        a.fire(1);
        b.fire(2);
        assert_eq!(*values.lock(), vec![2]);

        remove_a.dispose();
        assert_eq!(multiplexer.len(), 1);
    }

    #[test]
    #[parallel]
    fn test_multiplexer_removal_without_listeners() {
        let a: Emitter<u32> = Emitter::new();
        let multiplexer = EventMultiplexer::new();
        multiplexer.add(a.event()).dispose();
        assert!(multiplexer.is_empty());

        let (values, _sub) = record(&multiplexer.event());
        a.fire(1);
        assert!(values.lock().is_empty());
        assert!(!a.has_listeners());
    }

    #[test]
    #[parallel]
    fn test_multiplexer_dispose_detaches_inputs() {
        let a: Emitter<u32> = Emitter::new();
        let multiplexer = EventMultiplexer::new();
        let _a = multiplexer.add(a.event());
        let (_values, _sub) = record(&multiplexer.event());

        multiplexer.dispose();
        assert!(!a.has_listeners());
    }

    #[test]
    #[parallel]
    fn test_bufferer_defers_until_closure_returns() {
        let emitter: Emitter<&'static str> = Emitter::new();
        let bufferer = EventBufferer::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        let _sub = bufferer
            .wrap_event(&emitter.event())
            .subscribe(move |value: &&'static str| sink.lock().push(*value));

        let result = bufferer.buffer_events(|| {
            emitter.fire("a");
            emitter.fire("b");
            order.lock().push("body");
            42
        });

        assert_eq!(result, 42);
        assert_eq!(*order.lock(), vec!["body", "a", "b"]);
        assert!(!bufferer.is_buffering());

        emitter.fire("c");
        assert_eq!(*order.lock(), vec!["body", "a", "b", "c"]);
    }

    #[test]
    #[parallel]
    fn test_bufferer_nesting_captures_in_innermost_buffer() {
        let emitter: Emitter<u32> = Emitter::new();
        let bufferer = EventBufferer::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        let _sub = bufferer
            .wrap_event(&emitter.event())
            .subscribe(move |n: &u32| sink.lock().push(format!("event {n}")));

        bufferer.buffer_events(|| {
            emitter.fire(1);
            bufferer.buffer_events(|| {
                emitter.fire(2);
            });
            order.lock().push("after inner".to_string());
            emitter.fire(3);
        });

        assert_eq!(
            *order.lock(),
            vec!["event 2", "after inner", "event 1", "event 3"]
        );
    }

    #[test]
    #[parallel]
    fn test_bufferer_recovers_after_panicking_closure() {
        let emitter: Emitter<u32> = Emitter::new();
        let bufferer = EventBufferer::new();
        let (values, _sub) = record(&bufferer.wrap_event(&emitter.event()));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            bufferer.buffer_events(|| {
                emitter.fire(1);
                panic!("closure failed");
            })
        }));

        assert!(outcome.is_err());
        assert!(!bufferer.is_buffering());
        assert!(values.lock().is_empty());

        emitter.fire(2);
        assert_eq!(*values.lock(), vec![2]);
    }

    #[test]
    #[parallel]
    fn test_relay_swaps_input_while_listening() {
        let first: Emitter<u32> = Emitter::new();
        let second: Emitter<u32> = Emitter::new();
        let relay = Relay::new();
        relay.set_input(first.event());
        assert!(!first.has_listeners());

        let (values, sub) = record(&relay.event());
        assert!(first.has_listeners());
        first.fire(1);

        relay.set_input(second.event());
        assert!(!first.has_listeners());
        assert!(second.has_listeners());
        first.fire(2);
        second.fire(3);

        sub.dispose();
        assert!(!second.has_listeners());
        assert_eq!(*values.lock(), vec![1, 3]);
    }

    #[test]
    #[parallel]
    fn test_relay_set_input_while_idle_is_free() {
        let input: Emitter<u32> = Emitter::new();
        let relay = Relay::new();
        relay.set_input(input.event());
        relay.set_input(input.event());
        assert!(!input.has_listeners());

        let (values, _sub) = record(&relay.event());
        input.fire(5);
        assert_eq!(*values.lock(), vec![5]);
        assert_eq!(input.listener_count(), 1);
    }

    #[test]
    #[parallel]
    fn test_relay_dispose() {
        let input: Emitter<u32> = Emitter::new();
        let relay = Relay::new();
        relay.set_input(input.event());
        let (values, _sub) = record(&relay.event());

        relay.dispose();
        input.fire(1);

        assert!(!input.has_listeners());
        assert!(values.lock().is_empty());
    }
}
