//! Retry and backoff policy.
//!
//! This module encapsulates error classification (rate limiting, timeouts,
//! unavailable services) and backoff decisions so that the scheduler and the
//! batch runner share a consistent policy.

mod classify;
mod error;
mod policy;

pub use classify::ErrorClassifier;
pub use error::{OperationError, SchedulerError};
pub use policy::{BackoffPolicy, ErrorKind, RetryDecision};
