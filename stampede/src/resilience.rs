//! Retry and circuit breaking around each store write.
mod circuit_breaker;
mod retry;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitOpen, CircuitState};
pub use retry::RetryPolicy;

use crate::classifier::ErrorClassifier;
use stampede_core::{ErrorCategory, FailureKind, StoreClient, WriteFailure, WriteItem};
use std::sync::Arc;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// Final result of a write after retries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WriteReport {
    pub error: Option<ErrorCategory>,
    /// Calls that actually reached the store.
    pub attempts: u32,
}

/// Store writes wrapped in classification, retry with backoff, and a shared circuit breaker.
pub struct ResilientWriter<C> {
    client: Arc<C>,
    classifier: Arc<dyn ErrorClassifier>,
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl<C: StoreClient> ResilientWriter<C> {
    pub fn new(
        client: Arc<C>,
        classifier: Arc<dyn ErrorClassifier>,
        policy: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client,
            classifier,
            policy,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Write `item`, retrying retryable categories up to the attempt ceiling.
    ///
    /// A circuit that is open when an attempt is due ends the write with
    /// [`ErrorCategory::CircuitOpen`], even if earlier attempts failed for another reason.
    pub async fn write(&self, item: &WriteItem) -> WriteReport {
        let mut attempts = 0;

        loop {
            let Ok(admission) = self.breaker.try_acquire() else {
                trace!(key = item.key(), "Short-circuited");
                return WriteReport {
                    error: Some(ErrorCategory::CircuitOpen),
                    attempts,
                };
            };
            attempts += 1;

            let category = match self.attempt(item).await {
                Ok(()) => {
                    self.breaker.on_success(admission);
                    if attempts > 1 {
                        debug!(key = item.key(), "Write succeeded after {attempts} attempts");
                    }
                    return WriteReport {
                        error: None,
                        attempts,
                    };
                }
                Err(failure) => self.classifier.classify(&failure),
            };

            if category.counts_against_breaker() {
                self.breaker.on_failure(admission);
            } else {
                self.breaker.on_success(admission);
            }

            if !category.is_retryable() || attempts >= self.policy.max_attempts() {
                trace!(key = item.key(), %category, attempts, "Write failed");
                return WriteReport {
                    error: Some(category),
                    attempts,
                };
            }

            let delay = self.policy.delay_for(attempts);
            trace!(
                key = item.key(),
                %category,
                "Attempt {attempts} failed; retrying in {delay:?}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, item: &WriteItem) -> Result<(), WriteFailure> {
        let write = self.client.write(item);
        match self.policy.attempt_timeout() {
            Some(limit) => match tokio::time::timeout(limit, write).await {
                Ok(res) => res.map(|_| ()),
                Err(_) => Err(WriteFailure::new(
                    FailureKind::Timeout,
                    format!("No response within {limit:?}"),
                )),
            },
            None => write.await.map(|_| ()),
        }
    }
}
