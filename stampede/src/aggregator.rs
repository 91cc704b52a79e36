//! Thread-safe outcome accumulation, bucketed by concurrency level.
use metrics_util::AtomicBucket;
use stampede_core::{
    CleanupReport, ErrorCategory, LatencyStats, LevelSummary, MetricsSnapshot, OperationOutcome,
    RunPlan, RunSummary, REPORTED_PERCENTILES,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error, PartialEq)]
pub enum AggregatorError {
    #[error("Aggregator already finalized")]
    AlreadyFinalized,

    #[error("Concurrency level {level} outside 1..={max}")]
    UnknownLevel { level: usize, max: usize },
}

/// Run-level facts the aggregator cannot observe itself.
#[derive(Clone, Debug, Default)]
pub struct FinalizeContext {
    pub duration: Duration,
    pub peak_in_flight: usize,
    pub cancelled: bool,
    pub abandoned: u64,
    pub cleanup: Option<CleanupReport>,
}

struct LevelBucket {
    success: AtomicU64,
    error: AtomicU64,
    retries: AtomicU64,
    categories: [AtomicU64; ErrorCategory::COUNT],
    cumulative_latency_ns: AtomicU64,
    latency: AtomicBucket<Duration>,
}

impl LevelBucket {
    fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            error: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            categories: Default::default(),
            cumulative_latency_ns: AtomicU64::new(0),
            latency: AtomicBucket::new(),
        }
    }

    fn record(&self, outcome: &OperationOutcome) {
        match outcome.error {
            None => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            Some(category) => {
                self.error.fetch_add(1, Ordering::Relaxed);
                self.categories[category.index()].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.retries
            .fetch_add(outcome.retries() as u64, Ordering::Relaxed);
        self.cumulative_latency_ns
            .fetch_add(duration_nanos(outcome.latency), Ordering::Relaxed);
        self.latency.push(outcome.latency);
    }

    fn summarize(&self, level: usize) -> Option<(LevelSummary, Vec<Duration>)> {
        let successes = self.success.load(Ordering::Acquire);
        let errors = self.error.load(Ordering::Acquire);
        if successes + errors == 0 {
            return None;
        }

        let errors_by_category = ErrorCategory::ALL
            .iter()
            .filter_map(|c| {
                let count = self.categories[c.index()].load(Ordering::Acquire);
                (count > 0).then_some((*c, count))
            })
            .collect();

        let mut samples = self.latency.data();
        samples.sort_unstable();

        let summary = LevelSummary {
            level,
            successes,
            errors,
            retries: self.retries.load(Ordering::Acquire),
            errors_by_category,
            cumulative_latency: Duration::from_nanos(
                self.cumulative_latency_ns.load(Ordering::Acquire),
            ),
            latency: latency_stats(&samples),
        };
        Some((summary, samples))
    }
}

/// Folds [`OperationOutcome`]s from any number of tasks into per-level buckets.
///
/// Latency samples are retained exactly (lock-free bucket per level) so percentiles are exact.
/// After [`MetricsAggregator::finalize`] every further `record` is rejected.
pub struct MetricsAggregator {
    target_name: String,
    environment_tag: String,
    buckets: Vec<LevelBucket>,
    finalized: AtomicBool,
}

impl MetricsAggregator {
    pub fn new(plan: &RunPlan) -> Self {
        let config = plan.config();
        Self::with_levels(
            &config.target_name,
            &config.environment_tag,
            config.concurrency_limit,
        )
    }

    pub fn with_levels(target_name: &str, environment_tag: &str, max_level: usize) -> Self {
        Self {
            target_name: target_name.to_string(),
            environment_tag: environment_tag.to_string(),
            buckets: (0..max_level.max(1)).map(|_| LevelBucket::new()).collect(),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn record(&self, outcome: OperationOutcome) -> Result<(), AggregatorError> {
        if self.finalized.load(Ordering::Acquire) {
            error!("Outcome recorded after finalize: {outcome:?}");
            return Err(AggregatorError::AlreadyFinalized);
        }

        let max = self.buckets.len();
        let bucket = outcome
            .level
            .checked_sub(1)
            .and_then(|idx| self.buckets.get(idx))
            .ok_or(AggregatorError::UnknownLevel {
                level: outcome.level,
                max,
            })?;

        bucket.record(&outcome);

        #[cfg(feature = "metrics")]
        emit_metrics(&outcome);

        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Current totals without consuming anything. Safe to call concurrently with `record`.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.collect().0
    }

    /// Build the run summary. Only the first call succeeds.
    pub fn finalize(&self, ctx: FinalizeContext) -> Result<RunSummary, AggregatorError> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            error!("Aggregator finalized twice");
            return Err(AggregatorError::AlreadyFinalized);
        }

        let (snapshot, _) = self.collect();
        let secs = ctx.duration.as_secs_f64();
        let throughput = if secs > 0. {
            snapshot.total_operations as f64 / secs
        } else {
            0.
        };

        Ok(RunSummary {
            target_name: self.target_name.clone(),
            environment_tag: self.environment_tag.clone(),
            total_operations: snapshot.total_operations,
            total_successes: snapshot.total_successes,
            total_errors: snapshot.total_errors,
            total_retries: snapshot.total_retries,
            circuit_open_rejections: snapshot.errors_for(ErrorCategory::CircuitOpen),
            errors_by_category: snapshot.errors_by_category,
            levels: snapshot.levels,
            latency: snapshot.latency,
            throughput,
            duration: ctx.duration,
            peak_in_flight: ctx.peak_in_flight,
            cancelled: ctx.cancelled,
            abandoned: ctx.abandoned,
            cleanup: ctx.cleanup,
        })
    }

    fn collect(&self) -> (MetricsSnapshot, Vec<Duration>) {
        let mut snapshot = MetricsSnapshot::default();
        let mut all_samples = vec![];

        for (idx, bucket) in self.buckets.iter().enumerate() {
            let Some((level, samples)) = bucket.summarize(idx + 1) else {
                continue;
            };

            snapshot.total_successes += level.successes;
            snapshot.total_errors += level.errors;
            snapshot.total_retries += level.retries;
            for (category, count) in &level.errors_by_category {
                *snapshot.errors_by_category.entry(*category).or_default() += count;
            }
            all_samples.extend(samples);
            snapshot.levels.push(level);
        }

        snapshot.total_operations = snapshot.total_successes + snapshot.total_errors;
        all_samples.sort_unstable();
        snapshot.latency = latency_stats(&all_samples);
        (snapshot, all_samples)
    }
}

#[cfg(feature = "metrics")]
fn emit_metrics(outcome: &OperationOutcome) {
    let level = outcome.level.to_string();
    metrics::histogram!(crate::LATENCY_METRIC, "level" => level)
        .record(outcome.latency.as_secs_f64());

    match outcome.error {
        None => metrics::counter!(crate::SUCCESS_METRIC).increment(1),
        Some(category) => {
            metrics::counter!(crate::ERROR_METRIC, "category" => category.as_str()).increment(1)
        }
    }

    if outcome.retries() > 0 {
        metrics::counter!(crate::RETRY_METRIC).increment(outcome.retries() as u64);
    }
}

/// Percentile by nearest rank over ascending `sorted` samples: the smallest sample such that at
/// least `pct` percent of samples are less than or equal to it. Equal samples are not
/// interpolated. Returns zero for an empty set.
pub fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let n = sorted.len();
    let rank = ((pct / 100.) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

fn latency_stats(sorted: &[Duration]) -> LatencyStats {
    if sorted.is_empty() {
        return LatencyStats::default();
    }

    let secs: Vec<f64> = sorted.iter().map(Duration::as_secs_f64).collect();
    let mean = statistical::mean(&secs);
    let std_dev = if secs.len() > 1 {
        statistical::standard_deviation(&secs, Some(mean))
    } else {
        0.
    };

    let [p50, p90, p95, p99] = REPORTED_PERCENTILES.map(|pct| percentile(sorted, pct));
    LatencyStats {
        p50,
        p90,
        p95,
        p99,
        mean: secs_to_duration(mean),
        std_dev: secs_to_duration(std_dev),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0. {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

fn duration_nanos(dur: Duration) -> u64 {
    dur.as_nanos().min(u64::MAX as u128) as u64
}
