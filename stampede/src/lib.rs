#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod aggregator;
mod classifier;
mod cleanup;
mod controller;
mod error;
mod generator;
mod resilience;
mod schedule;

pub use aggregator::{percentile, AggregatorError, FinalizeContext, MetricsAggregator};
pub use classifier::{ErrorClassifier, StoreErrorClassifier};
pub use controller::{ConcurrencyController, ControllerError, Permit};
pub use error::RunError;
pub use generator::GeneratorError;
pub use load_test::{execute, LoadTest, RunHandle};
pub use resilience::{
    Admission, CircuitBreaker, CircuitOpen, CircuitState, ResilientWriter, RetryPolicy,
    WriteReport,
};
pub use schedule::{Phase, RampSchedule};
pub use stampede_core;

/// Counter of writes that ended in success.
pub const SUCCESS_METRIC: &str = "stampede_write_success";
/// Counter of writes that ended in error, labelled by `category`.
pub const ERROR_METRIC: &str = "stampede_write_error";
/// Histogram of per-item latency in seconds across all attempts, labelled by `level`.
pub const LATENCY_METRIC: &str = "stampede_write_latency";
pub const RETRY_METRIC: &str = "stampede_write_retries";
pub const CONCURRENCY_METRIC: &str = "stampede_concurrency_level";

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    static DESCRIBED: std::sync::Once = std::sync::Once::new();
    DESCRIBED.call_once(|| {
        metrics::describe_counter!(SUCCESS_METRIC, "Writes that succeeded");
        metrics::describe_counter!(ERROR_METRIC, "Writes that failed, by category");
        metrics::describe_histogram!(
            LATENCY_METRIC,
            metrics::Unit::Seconds,
            "Write latency including retries"
        );
        metrics::describe_counter!(RETRY_METRIC, "Retried write attempts");
        metrics::describe_gauge!(CONCURRENCY_METRIC, "Active concurrency level");
    });
}

pub mod prelude {
    pub use crate::{execute, LoadTest, Phase, RunError, RunHandle};
    pub use stampede_core::{
        BreakerConfig, ErrorCategory, FailureKind, RetryConfig, RunConfig, RunSummary,
        StoreClient, WriteFailure, WriteItem,
    };
}
