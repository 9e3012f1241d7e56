//! Operation failure type and the terminal errors delivered to callers.

use std::fmt;

/// Failure reported by a scheduled operation.
///
/// Carries the message text and, when the failure came from an HTTP-like
/// service, the numeric status code. Both are inputs to classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    message: String,
    status: Option<u32>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Failure with a numeric status/code field (e.g. HTTP 429).
    pub fn with_status(status: u32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u32> {
        self.status
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.message.is_empty()) {
            (Some(code), true) => write!(f, "HTTP {}", code),
            (Some(code), false) => write!(f, "HTTP {}: {}", code, self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for OperationError {}

impl From<anyhow::Error> for OperationError {
    fn from(e: anyhow::Error) -> Self {
        OperationError::new(format!("{:#}", e))
    }
}

impl From<std::io::Error> for OperationError {
    fn from(e: std::io::Error) -> Self {
        OperationError::new(e.to_string())
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        OperationError::new(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        OperationError::new(message)
    }
}

/// Terminal failure of a scheduled task, delivered once through its handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Failure did not match any retryable signature; attempted once.
    #[error("permanent failure: {0}")]
    Permanent(OperationError),
    /// Transient failure persisted through every allowed retry.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: OperationError },
    /// Task was still queued when the queue was cleared.
    #[error("task cancelled before it ran")]
    Cancelled,
    /// Task was dropped without settling (operation panicked or runtime shut down).
    #[error("task abandoned before it settled")]
    Abandoned,
}

impl SchedulerError {
    /// The operation failure behind this error, if the operation ran.
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            SchedulerError::Permanent(e) => Some(e),
            SchedulerError::RetriesExhausted { last, .. } => Some(last),
            SchedulerError::Cancelled | SchedulerError::Abandoned => None,
        }
    }

    /// Total number of times the operation was executed.
    pub fn attempts(&self) -> u32 {
        match self {
            SchedulerError::RetriesExhausted { attempts, .. } => *attempts,
            SchedulerError::Permanent(_) => 1,
            SchedulerError::Cancelled | SchedulerError::Abandoned => 0,
        }
    }
}
