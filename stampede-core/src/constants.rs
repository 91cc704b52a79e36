use std::time::Duration;

/// Longest primary key the store accepts.
pub const MAX_KEY_LENGTH: usize = 255;

/// Hard ceiling for generated payloads. The store rejects items over 400 KB, so this leaves room
/// for the key and attributes.
pub const MAX_PAYLOAD_BYTES: usize = 350 * 1024;

pub const DEFAULT_PAYLOAD_BYTES: usize = 512;

pub const DEFAULT_MAX_CONCURRENCY_PERCENTAGE: f64 = 100.0;

/// Latency quantiles reported in every summary.
pub const REPORTED_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

/* Retry */

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(25);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);
/// Fraction of the computed delay added or removed at random.
pub const DEFAULT_JITTER: f64 = 0.2;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/* Circuit breaker */

pub const DEFAULT_BREAKER_WINDOW: usize = 50;
pub const DEFAULT_BREAKER_MINIMUM_CALLS: usize = 20;
/// Failure rate (in percent) over the window that opens the circuit.
pub const DEFAULT_BREAKER_FAILURE_RATE: f64 = 50.0;
pub const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(5);
pub const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 3;

/// How long in-flight writes may keep running after a cancellation.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
