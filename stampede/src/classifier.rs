//! Mapping store failures onto [`ErrorCategory`].
use stampede_core::{ErrorCategory, FailureKind, WriteFailure};

/// Classifies a failed write. Must be deterministic: the same failure always yields the same
/// category.
pub trait ErrorClassifier: Send + Sync + 'static {
    fn classify(&self, failure: &WriteFailure) -> ErrorCategory;
}

/// Default classifier for DynamoDB-style failure signals.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreErrorClassifier;

impl ErrorClassifier for StoreErrorClassifier {
    fn classify(&self, failure: &WriteFailure) -> ErrorCategory {
        match &failure.kind {
            FailureKind::ConditionalCheckFailed => ErrorCategory::DuplicateKey,
            FailureKind::ProvisionedThroughputExceeded => ErrorCategory::CapacityExceeded,
            FailureKind::RequestLimitExceeded | FailureKind::Throttled => ErrorCategory::Throttling,
            FailureKind::ItemTooLarge | FailureKind::InvalidRequest => ErrorCategory::Validation,
            FailureKind::ConnectionReset
            | FailureKind::ConnectionRefused
            | FailureKind::ServiceUnavailable => ErrorCategory::Network,
            FailureKind::Timeout => ErrorCategory::Timeout,
            FailureKind::Service { code } => classify_code(code),
            FailureKind::Other => ErrorCategory::Unknown,
        }
    }
}

fn classify_code(code: &str) -> ErrorCategory {
    match code {
        "ConditionalCheckFailedException" | "TransactionConflictException" => {
            ErrorCategory::DuplicateKey
        }
        "ProvisionedThroughputExceededException" | "ItemCollectionSizeLimitExceededException" => {
            ErrorCategory::CapacityExceeded
        }
        "ThrottlingException" | "RequestLimitExceeded" | "LimitExceededException" => {
            ErrorCategory::Throttling
        }
        "ValidationException" | "SerializationException" | "ResourceNotFoundException" => {
            ErrorCategory::Validation
        }
        "ServiceUnavailable" | "InternalServerError" => ErrorCategory::Network,
        "RequestTimeout" | "RequestTimeoutException" => ErrorCategory::Timeout,
        _ => ErrorCategory::Unknown,
    }
}
