use crate::constants::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
#[cfg(feature = "serde")]
use serde_with::{serde_as, DurationMilliSeconds};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Percentages are handled in thousandths of a percent so the derived item counts are exact
/// integers (`100.0%` is `100_000`).
const PERCENT_SCALE: u128 = 100_000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Target name must not be empty")]
    EmptyTargetName,

    #[error("Concurrency limit must be at least 1")]
    ZeroConcurrency,

    #[error("Total items must be at least 1")]
    ZeroItems,

    #[error("Max concurrency percentage must be within 0.1..=100.0, found {0}")]
    MaxConcurrencyPercentage(f64),

    #[error("Duplicate percentage must be within 0.0..=100.0, found {0}")]
    DuplicatePercentage(f64),

    #[error("Payload size must be within 1..={MAX_PAYLOAD_BYTES} bytes, found {0}")]
    PayloadSize(usize),

    #[error("Retry policy needs at least one attempt")]
    ZeroAttempts,

    #[error("Retry base delay {base:?} exceeds max delay {max:?}")]
    BackoffBounds { base: Duration, max: Duration },

    #[error("Retry jitter must be within 0.0..=1.0, found {0}")]
    Jitter(f64),

    #[error("Circuit breaker window must hold at least one call")]
    BreakerWindow,

    #[error("Circuit breaker minimum calls ({minimum}) must be within 1..={window}")]
    BreakerMinimumCalls { minimum: usize, window: usize },

    #[error("Circuit breaker failure rate must be within (0.0, 100.0], found {0}")]
    BreakerFailureRate(f64),

    #[error("Circuit breaker must allow at least one half-open trial call")]
    HalfOpenCalls,

    #[error("Configuration yields a max concurrency level below 1")]
    NoMaxConcurrencyLevel,

    #[error("Configuration yields no items for the max concurrency phase")]
    NoMaxConcurrencyItems,
}

/// Retry behavior for retryable write failures.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    #[cfg_attr(feature = "serde", serde_as(as = "DurationMilliSeconds<u64>"))]
    pub base_delay: Duration,
    #[cfg_attr(feature = "serde", serde_as(as = "DurationMilliSeconds<u64>"))]
    pub max_delay: Duration,
    pub jitter: f64,
    #[cfg_attr(feature = "serde", serde_as(as = "Option<DurationMilliSeconds<u64>>"))]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
            attempt_timeout: Some(DEFAULT_ATTEMPT_TIMEOUT),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct BreakerConfig {
    /// Number of most recent attempts the failure rate is computed over.
    pub window_size: usize,
    /// Attempts required in the window before the failure rate is evaluated.
    pub minimum_calls: usize,
    /// Failure rate in percent that opens the circuit.
    pub failure_rate_threshold: f64,
    #[cfg_attr(feature = "serde", serde_as(as = "DurationMilliSeconds<u64>"))]
    pub cooldown: Duration,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_BREAKER_WINDOW,
            minimum_calls: DEFAULT_BREAKER_MINIMUM_CALLS,
            failure_rate_threshold: DEFAULT_BREAKER_FAILURE_RATE,
            cooldown: DEFAULT_BREAKER_COOLDOWN,
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
        }
    }
}

/// Load test configuration as handed over by a configuration source.
///
/// Nothing is checked until [`RunConfig::validate`], which derives the [`RunPlan`].
///
/// # Example
/// ```
/// use stampede_core::RunConfig;
///
/// let plan = RunConfig::new("orders")
///     .concurrency_limit(10)
///     .total_items(100)
///     .max_concurrency_percentage(50.)
///     .validate()
///     .unwrap();
///
/// assert_eq!(plan.items_for_ramp_up, 50);
/// assert_eq!(plan.max_concurrency_level, 5);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RunConfig {
    pub target_name: String,
    pub concurrency_limit: usize,
    pub total_items: u64,
    pub max_concurrency_percentage: f64,
    pub duplicate_percentage: f64,
    pub cleanup_after_run: bool,
    pub environment_tag: String,
    pub payload_bytes: usize,
    pub key_prefix: String,
    pub max_tps: Option<NonZeroU32>,
    pub seed: Option<u64>,
    #[cfg_attr(feature = "serde", serde_as(as = "DurationMilliSeconds<u64>"))]
    pub drain_timeout: Duration,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_name: String::new(),
            concurrency_limit: 1,
            total_items: 1,
            max_concurrency_percentage: DEFAULT_MAX_CONCURRENCY_PERCENTAGE,
            duplicate_percentage: 0.,
            cleanup_after_run: false,
            environment_tag: "local".to_string(),
            payload_bytes: DEFAULT_PAYLOAD_BYTES,
            key_prefix: String::new(),
            max_tps: None,
            seed: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn new(target_name: &str) -> Self {
        Self {
            target_name: target_name.to_string(),
            ..Default::default()
        }
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn total_items(mut self, total: u64) -> Self {
        self.total_items = total;
        self
    }

    pub fn max_concurrency_percentage(mut self, percentage: f64) -> Self {
        self.max_concurrency_percentage = percentage;
        self
    }

    pub fn duplicate_percentage(mut self, percentage: f64) -> Self {
        self.duplicate_percentage = percentage;
        self
    }

    pub fn cleanup_after_run(mut self, cleanup: bool) -> Self {
        self.cleanup_after_run = cleanup;
        self
    }

    pub fn environment_tag(mut self, tag: &str) -> Self {
        self.environment_tag = tag.to_string();
        self
    }

    pub fn payload_bytes(mut self, bytes: usize) -> Self {
        self.payload_bytes = bytes;
        self
    }

    pub fn key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// Limit how many items are dispatched per second.
    pub fn max_tps(mut self, tps: NonZeroU32) -> Self {
        self.max_tps = Some(tps);
        self
    }

    /// Seed item generation so runs produce the same keys and duplicates.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Check every field and derive the phase split. Fails on the first violated rule.
    pub fn validate(self) -> Result<RunPlan, ConfigError> {
        if self.target_name.trim().is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.total_items == 0 {
            return Err(ConfigError::ZeroItems);
        }

        let max_pct = self.max_concurrency_percentage;
        if !(0.1..=100.).contains(&max_pct) {
            return Err(ConfigError::MaxConcurrencyPercentage(max_pct));
        }
        let dup_pct = self.duplicate_percentage;
        if !(0.0..=100.).contains(&dup_pct) {
            return Err(ConfigError::DuplicatePercentage(dup_pct));
        }
        if self.payload_bytes == 0 || self.payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(ConfigError::PayloadSize(self.payload_bytes));
        }

        self.validate_retry()?;
        self.validate_breaker()?;

        let scaled = (max_pct * 1000.).round() as u128;
        let items_for_max_concurrency = ceil_scaled(self.total_items as u128, scaled) as u64;
        let max_concurrency_level = ceil_scaled(self.concurrency_limit as u128, scaled) as usize;

        if max_concurrency_level < 1 {
            return Err(ConfigError::NoMaxConcurrencyLevel);
        }
        if items_for_max_concurrency < 1 {
            return Err(ConfigError::NoMaxConcurrencyItems);
        }

        Ok(RunPlan {
            items_for_ramp_up: self.total_items - items_for_max_concurrency,
            items_for_max_concurrency,
            max_concurrency_level: max_concurrency_level.min(self.concurrency_limit),
            config: self,
        })
    }

    fn validate_retry(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if retry.base_delay > retry.max_delay {
            return Err(ConfigError::BackoffBounds {
                base: retry.base_delay,
                max: retry.max_delay,
            });
        }
        if !(0.0..=1.).contains(&retry.jitter) {
            return Err(ConfigError::Jitter(retry.jitter));
        }
        Ok(())
    }

    fn validate_breaker(&self) -> Result<(), ConfigError> {
        let breaker = &self.breaker;
        if breaker.window_size == 0 {
            return Err(ConfigError::BreakerWindow);
        }
        if breaker.minimum_calls == 0 || breaker.minimum_calls > breaker.window_size {
            return Err(ConfigError::BreakerMinimumCalls {
                minimum: breaker.minimum_calls,
                window: breaker.window_size,
            });
        }
        let rate = breaker.failure_rate_threshold;
        if !(rate > 0. && rate <= 100.) {
            return Err(ConfigError::BreakerFailureRate(rate));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(ConfigError::HalfOpenCalls);
        }
        Ok(())
    }
}

/// A validated [`RunConfig`] together with the derived phase split.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub items_for_ramp_up: u64,
    pub items_for_max_concurrency: u64,
    pub max_concurrency_level: usize,
    config: RunConfig,
}

impl RunPlan {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn total_items(&self) -> u64 {
        self.config.total_items
    }

    pub fn concurrency_limit(&self) -> usize {
        self.config.concurrency_limit
    }
}

fn ceil_scaled(value: u128, scaled_pct: u128) -> u128 {
    (value * scaled_pct).div_ceil(PERCENT_SCALE)
}
