#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// A single write request. Built by the item generator and owned by the task that writes it.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteItem {
    key: String,
    payload: String,
    created_at: OffsetDateTime,
    attributes: BTreeMap<String, String>,
}

impl WriteItem {
    pub fn new(
        key: String,
        payload: String,
        created_at: OffsetDateTime,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            key,
            payload,
            created_at,
            attributes,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Approximate stored size: key, payload and every attribute name and value.
    pub fn size_bytes(&self) -> usize {
        self.key.len()
            + self.payload.len()
            + self
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// Acknowledgement returned by the store for an accepted write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ack {
    /// Capacity units the store charged for the write, if it reports them.
    pub consumed_capacity: Option<f64>,
}

/// The kind of failure signal a store client surfaced.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailureKind {
    /// The conditional put found the key already present.
    ConditionalCheckFailed,
    ProvisionedThroughputExceeded,
    RequestLimitExceeded,
    Throttled,
    ItemTooLarge,
    InvalidRequest,
    ConnectionReset,
    ConnectionRefused,
    Timeout,
    ServiceUnavailable,
    /// Any other store error code, matched by name.
    Service { code: String },
    Other,
}

/// Failure returned from a store call.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct WriteFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl WriteFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Final classification of a failed write.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorCategory {
    CapacityExceeded,
    DuplicateKey,
    Throttling,
    Network,
    Timeout,
    Validation,
    Unknown,
    /// The circuit breaker rejected the call before it reached the store.
    CircuitOpen,
}

impl ErrorCategory {
    pub const COUNT: usize = 8;

    pub const ALL: [ErrorCategory; Self::COUNT] = [
        ErrorCategory::CapacityExceeded,
        ErrorCategory::DuplicateKey,
        ErrorCategory::Throttling,
        ErrorCategory::Network,
        ErrorCategory::Timeout,
        ErrorCategory::Validation,
        ErrorCategory::Unknown,
        ErrorCategory::CircuitOpen,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Transient store-side conditions worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::CapacityExceeded
                | ErrorCategory::Throttling
                | ErrorCategory::Network
                | ErrorCategory::Timeout
        )
    }

    /// Whether the failure says something about the store's health. Duplicate keys and
    /// validation errors are answers from a healthy store.
    pub fn counts_against_breaker(self) -> bool {
        !matches!(
            self,
            ErrorCategory::DuplicateKey | ErrorCategory::Validation | ErrorCategory::CircuitOpen
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::CapacityExceeded => "capacity_exceeded",
            ErrorCategory::DuplicateKey => "duplicate_key",
            ErrorCategory::Throttling => "throttling",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unknown => "unknown",
            ErrorCategory::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one dispatched item, folded into the aggregator and then dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationOutcome {
    pub latency: Duration,
    pub error: Option<ErrorCategory>,
    pub level: usize,
    pub attempts: u32,
}

impl OperationOutcome {
    pub fn success(latency: Duration, level: usize, attempts: u32) -> Self {
        Self {
            latency,
            error: None,
            level,
            attempts,
        }
    }

    pub fn failure(category: ErrorCategory, latency: Duration, level: usize, attempts: u32) -> Self {
        Self {
            latency,
            error: Some(category),
            level,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}
