mod utils;
#[allow(unused)]
use utils::*;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use mock_store::MockStore;
use stampede::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn writes_are_reported_to_the_recorder() {
    init();
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let _ = recorder.install();

    let store = Arc::new(MockStore::new().fail_first(5, FailureKind::InvalidRequest));
    let summary = execute(store, config("orders", 1, 20)).await.unwrap();
    assert_eq!(summary.total_errors, 5);

    let mut successes = 0;
    let mut validation_errors = 0;
    let mut latencies = 0;
    let mut level_gauge = None;
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let key = key.key();
        match (key.name(), value) {
            (stampede::SUCCESS_METRIC, DebugValue::Counter(n)) => successes += n,
            (stampede::ERROR_METRIC, DebugValue::Counter(n)) => {
                assert!(key
                    .labels()
                    .any(|l| l.key() == "category" && l.value() == "validation"));
                validation_errors += n;
            }
            (stampede::LATENCY_METRIC, DebugValue::Histogram(values)) => {
                latencies += values.len();
            }
            (stampede::CONCURRENCY_METRIC, DebugValue::Gauge(level)) => {
                level_gauge = Some(level.into_inner());
            }
            _ => {}
        }
    }

    assert_eq!(successes, 15);
    assert_eq!(validation_errors, 5);
    assert_eq!(latencies, 20);
    assert_eq!(level_gauge, Some(1.));
}
