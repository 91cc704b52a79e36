mod utils;
#[allow(unused)]
use utils::*;

use mock_store::MockStore;
use stampede::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10_000)]
async fn cancel_stops_dispatch_and_drains() {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_millis(5)));
    let test = LoadTest::new(store.clone(), config("orders", 8, 1_000_000));
    let handle = test.handle();

    let run = tokio::spawn(test);
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.cancel();

    let summary = run.await.unwrap().unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.abandoned, 0);
    assert!(summary.total_operations > 0);
    assert!(summary.total_operations < 1_000_000);
    assert_eq!(summary.total_operations, store.writes());
    assert_eq!(store.in_flight(), 0);
    assert_eq!(handle.phase(), Phase::Done);
}

#[tokio::test(start_paused = true)]
async fn stragglers_are_abandoned_after_drain_timeout() {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_secs(3_600)));
    let test = LoadTest::new(
        store.clone(),
        config("orders", 4, 100).drain_timeout(Duration::from_millis(250)),
    );
    let handle = test.handle();

    let run = tokio::spawn(test);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.in_flight(), 4);
    handle.cancel();

    let summary = run.await.unwrap().unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.abandoned, 4);
    assert_eq!(summary.total_operations, 0);
    assert!(summary.duration < Duration::from_secs(1));
    assert_eq!(store.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn snapshots_track_progress() {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_millis(10)));
    let test = LoadTest::new(
        store,
        config("orders", 5, 500).max_concurrency_percentage(40.),
    );
    let handle = test.handle();

    let run = tokio::spawn(test);
    let mut last = 0;
    let mut phases = vec![];
    while !run.is_finished() {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if let Some(snapshot) = handle.snapshot() {
            assert!(snapshot.total_operations >= last);
            assert!(snapshot.total_operations <= 500);
            last = snapshot.total_operations;
        }
        let phase = handle.phase();
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
    }

    let summary = run.await.unwrap().unwrap();
    assert!(phases.contains(&Phase::RampUp));
    assert!(phases.contains(&Phase::Sustain));
    assert!(phases.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        handle.snapshot().map(|s| s.total_operations),
        Some(summary.total_operations)
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_with_everything_in_flight() {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_secs(3_600)));
    let retry = RetryConfig {
        attempt_timeout: None,
        ..fast_retry(4)
    };
    let test = LoadTest::new(
        store.clone(),
        config("orders", 3, 3)
            .retry(retry)
            .drain_timeout(Duration::from_millis(250)),
    );
    let handle = test.handle();

    let run = tokio::spawn(test);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.in_flight(), 3);
    handle.cancel();

    let summary = run.await.unwrap().unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.abandoned, 3);
    assert_eq!(summary.total_operations, 0);
    assert!(summary.duration < Duration::from_secs(1));
    assert_eq!(store.in_flight(), 0);
    assert_eq!(handle.phase(), Phase::Done);
}
