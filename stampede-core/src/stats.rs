use crate::data::ErrorCategory;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Latency distribution of a set of operations. Percentiles use the nearest-rank method.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub mean: Duration,
    pub std_dev: Duration,
    pub min: Duration,
    pub max: Duration,
}

/// Aggregates for operations dispatched at a single concurrency level.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelSummary {
    pub level: usize,
    pub successes: u64,
    pub errors: u64,
    pub retries: u64,
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    pub cumulative_latency: Duration,
    pub latency: LatencyStats,
}

impl LevelSummary {
    pub fn operations(&self) -> u64 {
        self.successes + self.errors
    }
}

/// Read-only view of the aggregator at some point during the run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    pub total_successes: u64,
    pub total_errors: u64,
    pub total_retries: u64,
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    pub latency: LatencyStats,
    /// Only levels that saw at least one operation, ascending.
    pub levels: Vec<LevelSummary>,
}

impl MetricsSnapshot {
    pub fn errors_for(&self, category: ErrorCategory) -> u64 {
        self.errors_by_category
            .get(&category)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CleanupReport {
    pub deleted: u64,
    pub failed: u64,
}

/// Final statistics for a load test run. Built once by the aggregator.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub target_name: String,
    pub environment_tag: String,
    pub total_operations: u64,
    pub total_successes: u64,
    pub total_errors: u64,
    pub total_retries: u64,
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    pub circuit_open_rejections: u64,
    pub levels: Vec<LevelSummary>,
    pub latency: LatencyStats,
    /// Operations per second over `duration`.
    pub throughput: f64,
    pub duration: Duration,
    pub peak_in_flight: usize,
    pub cancelled: bool,
    /// Tasks force-aborted after the drain timeout; they have no recorded outcome.
    pub abandoned: u64,
    pub cleanup: Option<CleanupReport>,
}

impl RunSummary {
    pub fn errors_for(&self, category: ErrorCategory) -> u64 {
        self.errors_by_category
            .get(&category)
            .copied()
            .unwrap_or_default()
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.
        } else {
            self.total_errors as f64 / self.total_operations as f64
        }
    }

    pub fn level(&self, level: usize) -> Option<&LevelSummary> {
        self.levels.iter().find(|l| l.level == level)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} [{}]: {} ops in {} ({:.2} ops/s), {} ok, {} err ({:.2}%), {} retries",
            self.target_name,
            self.environment_tag,
            self.total_operations,
            humantime::format_duration(self.duration),
            self.throughput,
            self.total_successes,
            self.total_errors,
            self.error_rate() * 100.,
            self.total_retries,
        )?;
        writeln!(f, "latency: {}", self.latency)?;

        for (category, count) in &self.errors_by_category {
            writeln!(f, "  {category}: {count}")?;
        }
        for level in &self.levels {
            writeln!(
                f,
                "  level {:>4}: {:>8} ok {:>8} err  p50={:?} p99={:?}",
                level.level, level.successes, level.errors, level.latency.p50, level.latency.p99,
            )?;
        }

        if self.cancelled {
            writeln!(f, "cancelled, {} tasks abandoned", self.abandoned)?;
        }
        if let Some(cleanup) = &self.cleanup {
            writeln!(
                f,
                "cleanup: {} deleted, {} failed",
                cleanup.deleted, cleanup.failed
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean={:?}, p50={:?}, p90={:?}, p95={:?}, p99={:?}, max={:?}",
            self.mean, self.p50, self.p90, self.p95, self.p99, self.max,
        )
    }
}
