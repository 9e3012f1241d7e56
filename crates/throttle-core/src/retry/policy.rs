use std::time::Duration;

use crate::config::SchedulerConfig;

/// Classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Matched a retryable signature (rate limited, timeout, unavailable...).
    Transient,
    /// Anything else; never retried.
    Permanent,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry: the failure is permanent.
    Permanent,
    /// Do not retry: the retry budget is spent.
    Exhausted,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Backoff delays between retries of a failing operation.
///
/// Exponential mode doubles the base delay on every retry; constant mode
/// always waits the base delay. No jitter is applied, so the computed delay
/// is also the minimum delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub exponential: bool,
    /// Upper bound on a single delay.
    pub max_delay: Option<Duration>,
}

/// Exponent cap; 2^20 times any sane base delay is already days.
const MAX_EXPONENT: u32 = 20;

impl BackoffPolicy {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            exponential: cfg.exponential_backoff,
            max_delay: cfg.max_delay_ms.map(Duration::from_millis),
        }
    }

    /// Delay before the next retry. `attempt` is 0 for the first retry.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let raw = if self.exponential {
            self.base_delay
                .saturating_mul(1u32 << attempt.min(MAX_EXPONENT))
        } else {
            self.base_delay
        };
        match self.max_delay {
            Some(max) => raw.min(max),
            None => raw,
        }
    }

    /// Combine classification and retry budget into a decision.
    ///
    /// `attempt` counts executions before the one that just failed, so the
    /// first failure is attempt 0 and the task stops once `attempt` reaches
    /// `max_retries`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind, max_retries: u32) -> RetryDecision {
        match kind {
            ErrorKind::Permanent => RetryDecision::Permanent,
            ErrorKind::Transient if attempt >= max_retries => RetryDecision::Exhausted,
            ErrorKind::Transient => RetryDecision::RetryAfter(self.next_delay(attempt)),
        }
    }
}
