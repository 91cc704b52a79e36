use crate::aggregator::AggregatorError;
use crate::generator::GeneratorError;
use stampede_core::ConfigError;
use thiserror::Error;

/// Conditions that abort a run. Per-write store failures never end up here; they are
/// classified and counted instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Item generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Aggregation failed: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("Load test polled again after completion")]
    AlreadyCompleted,
}
