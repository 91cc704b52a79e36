use stampede::prelude::*;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("stampede=debug,mock_store=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Millisecond-scale backoff so retry-heavy runs finish quickly.
#[allow(unused)]
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: 0.,
        attempt_timeout: Some(Duration::from_secs(5)),
    }
}

/// A breaker that never trips within a test-sized run.
#[allow(unused)]
pub fn inert_breaker() -> BreakerConfig {
    BreakerConfig {
        window_size: 1_000,
        minimum_calls: 1_000,
        ..Default::default()
    }
}

#[allow(unused)]
pub fn config(target: &str, limit: usize, items: u64) -> RunConfig {
    RunConfig::new(target)
        .concurrency_limit(limit)
        .total_items(items)
        .environment_tag("test")
        .retry(fast_retry(4))
        .breaker(inert_breaker())
}
