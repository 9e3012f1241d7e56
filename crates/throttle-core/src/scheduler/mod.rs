//! Rate-limited, priority-ordered task scheduler.
//!
//! Callers submit operations against a rate-limited external service; the
//! scheduler bounds how many run at once (`max_concurrent`), spaces their
//! starts (`delay_between_requests_ms`), dispatches by descending priority
//! (FIFO within a priority) and retries transient failures with backoff.
//! Each submission returns a [`TaskHandle`] that settles exactly once.
//!
//! There is no intrinsic per-task timeout: an operation that never settles
//! holds its slot. Wrap such operations with [`crate::operation::with_timeout`].

mod dispatch;
mod guard;
mod queue;
mod task;

use std::future::Future;
use std::sync::Arc;

use crate::config::{ConfigError, SchedulerConfig};
use crate::observability::{ObservabilitySink, TracingSink};
use crate::operation;
use crate::retry::OperationError;

use self::dispatch::Shared;
use self::task::Task;

pub use task::{TaskHandle, TaskOptions, TaskState};

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub queue_length: usize,
    pub active_count: usize,
    pub max_concurrent: usize,
    /// Tasks waiting out a backoff delay before re-entering the queue.
    pub retry_scheduled: usize,
}

/// Scheduler instance. Cloning is cheap and yields a handle to the same
/// queue and active set.
pub struct Scheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Scheduler<T> {
    /// Build a scheduler; fails if the configuration is invalid.
    pub fn new(
        config: SchedulerConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, sink)),
        })
    }

    /// Scheduler that reports retry outcomes to the tracing log.
    pub fn with_tracing(config: SchedulerConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(TracingSink))
    }

    /// Submit an operation with default options (priority 0).
    pub fn submit<F, Fut>(&self, operation: F) -> TaskHandle<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        self.submit_with(TaskOptions::default(), operation)
    }

    /// Submit an operation. Never blocks; must be called within a Tokio
    /// runtime. The operation may run several times (one call per attempt),
    /// so it must be safe to retry.
    pub fn submit_with<F, Fut>(&self, options: TaskOptions, operation: F) -> TaskHandle<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        let (task, handle) = Task::new(options, operation::boxed(operation));
        self.shared.enqueue(task);
        handle
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.shared.lock();
        SchedulerStatus {
            queue_length: state.queue.len(),
            active_count: state.active,
            max_concurrent: self.shared.config.max_concurrent,
            retry_scheduled: state.retry_scheduled,
        }
    }

    /// Reject every queued task with `Cancelled` and return how many there
    /// were. Running tasks and tasks waiting out a backoff delay are not
    /// affected; the latter re-enter the queue when their delay ends.
    pub fn clear(&self) -> usize {
        self.shared.clear()
    }
}
