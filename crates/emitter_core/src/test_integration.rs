#[cfg(test)]
use super::*;
#[cfg(test)]
use parking_lot::Mutex;
#[cfg(test)]
use serial_test::{parallel, serial};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tracing::debug;

// Document model used by the scenarios below
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
struct DocumentChange {
    uri: String,
    version: u32,
}

#[cfg(test)]
fn change(uri: &str, version: u32) -> DocumentChange {
    DocumentChange {
        uri: uri.to_string(),
        version,
    }
}

#[test]
#[parallel]
fn test_pipeline_over_shared_queue() {
    let queue = Arc::new(EventDeliveryQueue::new());
    let edits: Emitter<DocumentChange> = Emitter::with_options(EmitterOptions::new().delivery_queue(Arc::clone(&queue)));
    let saves: Emitter<String> = Emitter::with_options(EmitterOptions::new().delivery_queue(Arc::clone(&queue)));
    let log = Arc::new(Mutex::new(Vec::new()));

    // Saving re-enters from inside an edit listener
    let save_on_edit = saves.clone();
    let _autosave = edits.event().subscribe(move |change: &DocumentChange| {
        if change.version % 2 == 0 {
            save_on_edit.fire(change.uri.clone());
        }
    });
    let edit_log = Arc::clone(&log);
    let _edits = edits
        .event()
        .subscribe(move |change: &DocumentChange| edit_log.lock().push(format!("edit {}@{}", change.uri, change.version)));
    let save_log = Arc::clone(&log);
    let _saves = saves.event().subscribe(move |uri: &String| save_log.lock().push(format!("save {uri}")));

    edits.fire(change("a.rs", 2));
    edits.fire(change("b.rs", 3));

    debug!("🔧 shared queue log: {:?}", log.lock());
    assert_eq!(*log.lock(), vec!["edit a.rs@2", "save a.rs", "edit b.rs@3"]);
    assert!(queue.is_empty());
}

#[test]
#[parallel]
fn test_chain_debounce_multiplexer_relay() {
    let scheduler = ManualScheduler::new();
    let left: Emitter<DocumentChange> = Emitter::new();
    let right: Emitter<DocumentChange> = Emitter::new();

    let multiplexer = EventMultiplexer::new();
    let _left = multiplexer.add(left.event());
    let _right = multiplexer.add(right.event());

    let versions = combinators::chain(&multiplexer.event())
        .filter(|c: &DocumentChange| c.uri.ends_with(".rs"))
        .map(|c: &DocumentChange| c.version)
        .debounce(
            |last: Option<Vec<u32>>, v: &u32| {
                let mut all = last.unwrap_or_default();
                all.push(*v);
                all
            },
            scheduler.clone(),
            combinators::DebounceOptions {
                delay: combinators::DebounceDelay::After(Duration::from_millis(25)),
                ..Default::default()
            },
        );

    let relay = Relay::new();
    relay.set_input(versions.event());
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&batches);
    let listener = relay.event().subscribe(move |batch: &Vec<u32>| sink.lock().push(batch.clone()));
    assert!(left.has_listeners());

    left.fire(change("main.rs", 1));
    right.fire(change("notes.md", 2));
    right.fire(change("lib.rs", 3));
    scheduler.advance(Duration::from_millis(25));

    assert_eq!(*batches.lock(), vec![vec![1, 3]]);

    listener.dispose();
    assert!(!left.has_listeners());
    assert!(!right.has_listeners());
    versions.dispose();
}

#[test]
#[parallel]
fn test_pauseable_feeding_bufferer() {
    let emitter = PauseableEmitter::with_merge(Arc::new(|batch: Vec<DocumentChange>| -> DocumentChange {
        batch.into_iter().max_by_key(|c| c.version).unwrap_or_else(|| change("", 0))
    }));
    let bufferer = EventBufferer::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let _sub = bufferer
        .wrap_event(&emitter.event())
        .subscribe(move |c: &DocumentChange| sink.lock().push(c.version));

    bufferer.buffer_events(|| {
        emitter.pause();
        emitter.fire(change("a", 1));
        emitter.fire(change("a", 5));
        emitter.fire(change("a", 3));
        emitter.resume();
        assert!(seen.lock().is_empty());
    });

    assert_eq!(*seen.lock(), vec![5]);
}

#[tokio::test(start_paused = true)]
#[parallel]
async fn test_async_save_participants() {
    let emitter: AsyncEmitter<DocumentChange> = AsyncEmitter::new();
    let journal = Arc::new(Mutex::new(Vec::new()));

    let formatter = Arc::clone(&journal);
    let _format = emitter.event().subscribe(move |e: &WaitUntilEvent<DocumentChange>| {
        let (journal, uri) = (Arc::clone(&formatter), e.uri.clone());
        let _ = e.wait_until(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            journal.lock().push(format!("formatted {uri}"));
            Ok(())
        });
    });
    let writer = Arc::clone(&journal);
    let _write = emitter.event().subscribe(move |e: &WaitUntilEvent<DocumentChange>| {
        writer.lock().push(format!("written {}@{}", e.uri, e.version));
    });

    emitter.fire_async(change("main.rs", 4), &CancellationToken::new()).await;

    assert_eq!(*journal.lock(), vec!["formatted main.rs", "written main.rs@4"]);
}

#[test]
#[serial]
fn test_config_threshold_applies_to_new_emitters() {
    let config = EventCoreConfig::from_toml_str("leak_warning_threshold = 4\n").expect("valid config");
    let applied = config.apply();

    let emitter: Emitter<()> = Emitter::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let subscriptions: Vec<Disposable> = (0..13)
        .map(|_| {
            let fired = Arc::clone(&fired);
            emitter.event().subscribe(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    assert_eq!(emitter.listener_count(), 12);
    assert!(subscriptions[12].is_disposed());
    assert!(emitter.leakage_monitor().is_some());

    emitter.fire(());
    assert_eq!(fired.load(Ordering::SeqCst), 12);

    applied.dispose();
    assert_eq!(global_leak_warning_threshold(), -1);
    assert!(Emitter::<()>::new().leakage_monitor().is_none());
    drop(subscriptions);
}
