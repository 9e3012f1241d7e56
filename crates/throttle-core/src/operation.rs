//! Operation types accepted by the scheduler, plus a timeout wrapper.
//!
//! The scheduler has no intrinsic per-task timeout: an operation that never
//! settles keeps its concurrency slot. Callers that talk to services which
//! can hang wrap their operation with [`with_timeout`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::retry::OperationError;

/// Boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Type-erased operation: called once per attempt.
pub type Operation<T> = Arc<dyn Fn() -> BoxFuture<Result<T, OperationError>> + Send + Sync>;

/// Erase a closure into an [`Operation`].
pub fn boxed<T, F, Fut>(operation: F) -> Operation<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
{
    Arc::new(move || Box::pin(operation()) as BoxFuture<Result<T, OperationError>>)
}

/// Wrap an operation so each attempt fails with a "timeout" error once it
/// runs longer than `limit`. The message matches the default retryable
/// signatures, so a timed-out attempt is retried like any transient failure.
pub fn with_timeout<T, F, Fut>(
    limit: Duration,
    operation: F,
) -> impl Fn() -> BoxFuture<Result<T, OperationError>> + Send + Sync + 'static
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
{
    move || {
        let attempt = operation();
        Box::pin(async move {
            match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(OperationError::new(format!(
                    "operation timeout after {} ms",
                    limit.as_millis()
                ))),
            }
        }) as BoxFuture<Result<T, OperationError>>
    }
}
