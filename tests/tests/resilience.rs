mod utils;
#[allow(unused)]
use utils::*;

use mock_store::MockStore;
use stampede::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[ntest::timeout(10_000)]
async fn open_circuit_rejections_are_counted() {
    init();
    let store = Arc::new(MockStore::new().fail_always(FailureKind::Throttled));
    let breaker = BreakerConfig {
        window_size: 10,
        minimum_calls: 10,
        failure_rate_threshold: 50.,
        cooldown: Duration::from_secs(3_600),
        half_open_max_calls: 1,
    };

    let summary = execute(store.clone(), config("orders", 1, 100).breaker(breaker))
        .await
        .unwrap();

    assert_eq!(summary.total_operations, 100);
    assert_eq!(summary.total_errors, 100);
    assert_eq!(store.writes(), 10);
    assert!(summary.circuit_open_rejections >= 97);
    assert_eq!(
        summary.errors_by_category.values().sum::<u64>(),
        summary.total_errors
    );
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn breaker_closes_after_cooldown() {
    init();
    let store = Arc::new(MockStore::new().fail_first(10, FailureKind::ServiceUnavailable));
    let breaker = BreakerConfig {
        window_size: 10,
        minimum_calls: 10,
        failure_rate_threshold: 50.,
        cooldown: Duration::from_millis(100),
        half_open_max_calls: 1,
    };

    let summary = execute(
        store.clone(),
        config("orders", 1, 40)
            .retry(fast_retry(1))
            .breaker(breaker)
            .max_tps(NonZeroU32::new(20).unwrap()),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_operations, 40);
    assert_eq!(summary.errors_for(ErrorCategory::Network), 10);
    assert!(summary.circuit_open_rejections > 0);
    assert!(summary.total_successes >= 15);
}

#[tokio::test]
async fn validation_failures_do_not_trip_the_breaker() {
    init();
    let store = Arc::new(MockStore::new().fail_always(FailureKind::InvalidRequest));
    let breaker = BreakerConfig {
        window_size: 5,
        minimum_calls: 5,
        failure_rate_threshold: 10.,
        ..Default::default()
    };

    let summary = execute(store.clone(), config("orders", 2, 50).breaker(breaker))
        .await
        .unwrap();

    assert_eq!(summary.errors_for(ErrorCategory::Validation), 50);
    assert_eq!(summary.circuit_open_rejections, 0);
    assert_eq!(summary.total_retries, 0);
    assert_eq!(store.writes(), 50);
}

#[tokio::test(start_paused = true)]
async fn slow_writes_time_out() {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_secs(30)));
    let retry = RetryConfig {
        attempt_timeout: Some(Duration::from_millis(100)),
        ..fast_retry(2)
    };

    let summary = execute(store, config("orders", 2, 6).retry(retry))
        .await
        .unwrap();

    assert_eq!(summary.errors_for(ErrorCategory::Timeout), 6);
    assert_eq!(summary.total_retries, 6);
    assert!(summary.latency.min >= Duration::from_millis(200));
}
