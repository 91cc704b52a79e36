mod utils;
#[allow(unused)]
use utils::*;

use mock_store::MockStore;
use stampede::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_item_is_recorded_once() -> anyhow::Result<()> {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_millis(1)));

    let summary = execute(
        store.clone(),
        config("orders", 16, 1_000).max_concurrency_percentage(25.),
    )
    .await?;

    assert_eq!(summary.total_operations, 1_000);
    assert_eq!(summary.total_successes, 1_000);
    assert_eq!(summary.total_errors, 0);
    assert_eq!(
        summary.levels.iter().map(|l| l.operations()).sum::<u64>(),
        1_000
    );
    assert_eq!(store.len(), 1_000);
    assert!(summary.peak_in_flight <= 16);
    assert!(store.peak_in_flight() <= 16);
    assert!(summary.throughput > 0.);
    assert_eq!(summary.environment_tag, "test");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ramp_reaches_max_level() -> anyhow::Result<()> {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_millis(2)));

    let summary = execute(
        store.clone(),
        config("orders", 10, 100).max_concurrency_percentage(50.),
    )
    .await?;

    assert_eq!(summary.total_operations, 100);
    assert_eq!(summary.levels.last().map(|l| l.level), Some(5));
    assert!(summary.levels.iter().all(|l| (1..=5).contains(&l.level)));
    assert_eq!(summary.level(1).map(|l| l.operations()), Some(10));
    assert!(store.peak_in_flight() <= 5);
    Ok(())
}

#[tokio::test]
async fn capacity_failures_retry_to_the_ceiling() -> anyhow::Result<()> {
    init();
    let store =
        Arc::new(MockStore::new().fail_always(FailureKind::ProvisionedThroughputExceeded));

    let summary = execute(store.clone(), config("orders", 4, 20)).await?;

    assert_eq!(summary.total_operations, 20);
    assert_eq!(summary.total_errors, 20);
    assert_eq!(summary.errors_for(ErrorCategory::CapacityExceeded), 20);
    assert_eq!(summary.total_retries, 60);
    assert_eq!(store.writes(), 80);
    Ok(())
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn transient_failures_recover() {
    init();
    let store = Arc::new(MockStore::new().fail_first(3, FailureKind::ConnectionReset));

    let summary = execute(store.clone(), config("orders", 1, 50)).await.unwrap();

    assert_eq!(summary.total_successes, 50);
    assert_eq!(summary.total_retries, 3);
    assert_eq!(summary.level(1).map(|l| l.retries), Some(3));
    assert_eq!(store.len(), 50);
}

#[tokio::test]
async fn duplicate_rate_at_single_concurrency() -> anyhow::Result<()> {
    init();
    let store = Arc::new(MockStore::new());

    let summary = execute(
        store.clone(),
        config("orders", 1, 1_000)
            .duplicate_percentage(20.)
            .seed(1_234),
    )
    .await?;

    let duplicates = summary.errors_for(ErrorCategory::DuplicateKey);
    assert!((150..=250).contains(&duplicates), "{duplicates} duplicates");
    assert_eq!(summary.total_errors, duplicates);
    assert_eq!(summary.total_retries, 0);
    assert_eq!(store.len() as u64, 1_000 - duplicates);
    Ok(())
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn latency_includes_store_time() {
    init();
    let store = Arc::new(MockStore::new().latency(Duration::from_millis(5)));

    let summary = execute(store, config("orders", 4, 40)).await.unwrap();

    let latency = &summary.latency;
    assert!(latency.min >= Duration::from_millis(5));
    assert!(latency.p50 <= latency.p90);
    assert!(latency.p90 <= latency.p95);
    assert!(latency.p95 <= latency.p99);
    assert!(latency.p99 <= latency.max);
}

#[tokio::test]
async fn max_tps_paces_dispatch() -> anyhow::Result<()> {
    init();
    let store = Arc::new(MockStore::new());

    let summary = execute(
        store,
        config("orders", 4, 15).max_tps(NonZeroU32::new(10).unwrap()),
    )
    .await?;

    assert_eq!(summary.total_operations, 15);
    assert!(
        summary.duration >= Duration::from_millis(350),
        "finished in {:?}",
        summary.duration
    );
    Ok(())
}

#[tokio::test]
async fn invalid_config_fails_before_any_write() {
    init();
    let store = Arc::new(MockStore::new());

    let res = execute(
        store.clone(),
        config("orders", 10, 100).max_concurrency_percentage(0.),
    )
    .await;

    assert!(matches!(res, Err(RunError::Config(_))));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn cleanup_deletes_every_issued_key() -> anyhow::Result<()> {
    init();
    let store = Arc::new(MockStore::new());

    let summary = execute(
        store.clone(),
        config("orders", 8, 300).cleanup_after_run(true),
    )
    .await?;

    let cleanup = summary.cleanup.clone().unwrap_or_default();
    assert_eq!(cleanup.deleted, 300);
    assert_eq!(cleanup.failed, 0);
    assert!(store.is_empty());
    assert!(summary.to_string().contains("cleanup"));
    Ok(())
}
