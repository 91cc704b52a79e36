use crate::data::{Ack, WriteFailure, WriteItem};
use std::future::Future;

/// The key-value store under test.
///
/// Implementations wrap the actual store SDK. `write` must be a conditional put that fails with
/// [`FailureKind::ConditionalCheckFailed`](crate::FailureKind::ConditionalCheckFailed) when the
/// key already exists, which is how injected duplicates surface.
pub trait StoreClient: Send + Sync + 'static {
    fn write(&self, item: &WriteItem) -> impl Future<Output = Result<Ack, WriteFailure>> + Send;

    /// Remove a key written during the run. Missing keys are not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), WriteFailure>> + Send;
}
