//! An in-memory key-value store for exercising the load engine without a real backend.
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use stampede_core::{Ack, FailureKind, StoreClient, WriteFailure, WriteItem};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, PoisonError, RwLock,
};
use std::time::Duration;
use tracing::{debug, trace};

/// Conditional-put store with injectable latency, throughput capacity and failures.
///
/// Writes to an existing key fail with [`FailureKind::ConditionalCheckFailed`]. Deleting a
/// missing key succeeds.
#[derive(Default)]
pub struct MockStore {
    items: RwLock<HashMap<String, String>>,
    latency: Duration,
    jitter: Option<Normal<f64>>,
    capacity: Option<DefaultDirectRateLimiter>,
    failures: Failures,
    delete_failure: Option<FailureKind>,
    writes: AtomicU64,
    deletes: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

#[derive(Default)]
struct Failures {
    always: Option<FailureKind>,
    first: Option<(AtomicU64, FailureKind)>,
    rate: Option<(f64, FailureKind)>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Spread the latency normally with standard deviation `std_dev`. Never goes below zero.
    pub fn jitter(mut self, std_dev: Duration) -> Self {
        self.jitter = Normal::new(self.latency.as_secs_f64(), std_dev.as_secs_f64()).ok();
        self
    }

    /// Accept at most `tps` writes per second; the rest fail with
    /// [`FailureKind::ProvisionedThroughputExceeded`].
    pub fn capacity(mut self, tps: NonZeroU32) -> Self {
        self.capacity = Some(RateLimiter::direct(Quota::per_second(tps)));
        self
    }

    pub fn fail_always(mut self, kind: FailureKind) -> Self {
        self.failures.always = Some(kind);
        self
    }

    /// Fail the first `count` writes, then behave normally.
    pub fn fail_first(mut self, count: u64, kind: FailureKind) -> Self {
        self.failures.first = Some((AtomicU64::new(count), kind));
        self
    }

    /// Fail each write independently with probability `ratio`.
    pub fn fail_rate(mut self, ratio: f64, kind: FailureKind) -> Self {
        self.failures.rate = Some((ratio.clamp(0., 1.), kind));
        self
    }

    pub fn fail_deletes(mut self, kind: FailureKind) -> Self {
        self.delete_failure = Some(kind);
        self
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Write calls received, including failed ones.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of calls in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    async fn delay(&self) {
        let delay = match &self.jitter {
            Some(normal) => {
                let secs = normal.sample(&mut rand::thread_rng());
                Duration::from_secs_f64(secs.max(0.))
            }
            None => self.latency,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn enter(&self) -> InFlight {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlight(self.in_flight.clone())
    }

    fn injected_failure(&self) -> Option<WriteFailure> {
        if let Some(kind) = &self.failures.always {
            return Some(WriteFailure::new(kind.clone(), "injected failure"));
        }

        if let Some((remaining, kind)) = &self.failures.first {
            let failed = remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Some(WriteFailure::new(kind.clone(), "injected failure"));
            }
        }

        if let Some((ratio, kind)) = &self.failures.rate {
            if rand::thread_rng().gen_bool(*ratio) {
                return Some(WriteFailure::new(kind.clone(), "injected failure"));
            }
        }

        if let Some(limiter) = &self.capacity {
            if limiter.check().is_err() {
                return Some(WriteFailure::new(
                    FailureKind::ProvisionedThroughputExceeded,
                    "The level of configured provisioned throughput for the table was exceeded",
                ));
            }
        }

        None
    }
}

impl StoreClient for MockStore {
    async fn write(&self, item: &WriteItem) -> Result<Ack, WriteFailure> {
        self.writes.fetch_add(1, Ordering::AcqRel);
        counter!("mock_store.writes").increment(1);
        let _guard = self.enter();
        self.delay().await;

        if let Some(failure) = self.injected_failure() {
            trace!(key = item.key(), "Rejecting write: {failure}");
            return Err(failure);
        }

        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.contains_key(item.key()) {
            debug!(key = item.key(), "Conditional check failed");
            return Err(WriteFailure::new(
                FailureKind::ConditionalCheckFailed,
                "The conditional request failed",
            ));
        }
        items.insert(item.key().to_string(), item.payload().to_string());

        Ok(Ack {
            consumed_capacity: Some(item.size_bytes().div_ceil(1024) as f64),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), WriteFailure> {
        self.deletes.fetch_add(1, Ordering::AcqRel);
        let _guard = self.enter();
        self.delay().await;

        if let Some(kind) = &self.delete_failure {
            return Err(WriteFailure::new(kind.clone(), "injected failure"));
        }

        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
