//! Watch loop against real file system notifications

mod common;

use std::thread;
use std::time::Duration;

use common::{object_schema, Fixture};
use json_schema_manager::{TestKind, Tester, WatchExit, WatchLoop};
use serde_json::json;

#[test]
fn test_watch_reruns_tests_after_change() {
    let fx = Fixture::new();
    let key = fx.write_json_schema("acme_widget_1_0_0", object_schema(&["name"]));
    let named = fx.write_test_doc(&key, TestKind::Fail, "named.json", json!({}));

    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    let (cancel_tx, cancel_rx) = crossbeam_channel::unbounded();

    let writer_cancel = cancel_tx.clone();
    let writer = thread::spawn(move || {
        ready_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        // accepted by the schema, so it breaks the fail expectation
        std::fs::write(&named, json!({"name": "x"}).to_string()).unwrap();
        thread::sleep(Duration::from_secs(10));
        let _ = writer_cancel.send(());
    });

    let tester = Tester::new(&fx.registry);
    let mut runs = Vec::new();
    let exit = WatchLoop::new(&tester)
        .debounce(Duration::from_millis(50))
        .ready(ready_tx)
        .run(&[key.clone()], &cancel_rx, |changed, result| {
            runs.push((changed.clone(), result.map(|r| r.is_success())));
            let _ = cancel_tx.send(());
        })
        .unwrap();

    assert_eq!(exit, WatchExit::Cancelled);
    assert_eq!(runs.len(), 1);
    let (changed, outcome) = &runs[0];
    assert_eq!(changed, &key);
    assert!(matches!(outcome, Ok(false)));

    drop(writer);
}

#[test]
fn test_cancel_before_any_change() {
    let fx = Fixture::new();
    let key = fx.write_json_schema("acme_widget_1_0_0", object_schema(&[]));

    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    let (cancel_tx, cancel_rx) = crossbeam_channel::unbounded();
    let canceller = thread::spawn(move || {
        ready_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        cancel_tx.send(()).unwrap();
    });

    let tester = Tester::new(&fx.registry);
    let mut runs = 0;
    let exit = WatchLoop::new(&tester)
        .ready(ready_tx)
        .run(&[key], &cancel_rx, |_, _| runs += 1)
        .unwrap();

    canceller.join().unwrap();
    assert_eq!(exit, WatchExit::Cancelled);
    assert_eq!(runs, 0);
}
