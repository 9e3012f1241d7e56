//! Task state machine, submit options and the caller-side handle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::operation::Operation;
use crate::retry::{OperationError, SchedulerError};

/// Lifecycle state of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the queue.
    Queued,
    /// Dispatched into the active set (pacing delay, then the operation).
    Running,
    /// Failed transiently; waiting out a backoff delay before re-queueing.
    RetryScheduled,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, RetryScheduled)
                | (RetryScheduled, Queued)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Per-submission options.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Name used in log records.
    pub name: String,
    /// Higher dispatches sooner.
    pub priority: i32,
    /// Identifier of the entity the operation is about (e.g. a vehicle id).
    pub correlation_id: Option<String>,
    /// Overrides the scheduler's `max_retries` for this task.
    pub max_retries: Option<u32>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            name: "operation".to_string(),
            priority: 0,
            correlation_id: None,
            max_retries: None,
        }
    }
}

impl TaskOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// One scheduled unit of work. Owned by the scheduler until it settles.
pub(super) struct Task<T> {
    pub(super) operation: Operation<T>,
    pub(super) name: String,
    pub(super) priority: i32,
    /// Queue sequence number assigned at submit; kept across retries.
    pub(super) seq: u64,
    /// Executions so far.
    pub(super) attempt: u32,
    pub(super) max_retries: Option<u32>,
    pub(super) correlation_id: Option<String>,
    /// Most recent transient failure, reported if a later attempt succeeds.
    pub(super) last_error: Option<OperationError>,
    state: TaskState,
    respond_to: oneshot::Sender<Result<T, SchedulerError>>,
}

impl<T> Task<T> {
    pub(super) fn new(
        options: TaskOptions,
        operation: Operation<T>,
    ) -> (Self, TaskHandle<T>) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            operation,
            name: options.name,
            priority: options.priority,
            seq: 0,
            attempt: 0,
            max_retries: options.max_retries,
            correlation_id: options.correlation_id,
            last_error: None,
            state: TaskState::Queued,
            respond_to: tx,
        };
        (task, TaskHandle { rx })
    }

    pub(super) fn state(&self) -> TaskState {
        self.state
    }

    pub(super) fn transition(&mut self, next: TaskState) {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                task = %self.name,
                from = ?self.state,
                to = ?next,
                "invalid task state transition"
            );
            debug_assert!(false, "invalid transition {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    /// Deliver the terminal result. The caller may have dropped its handle;
    /// that is not an error.
    pub(super) fn settle(self, result: Result<T, SchedulerError>) {
        debug_assert!(self.state.is_terminal());
        if self.respond_to.send(result).is_err() {
            tracing::trace!(task = %self.name, "result discarded: handle dropped");
        }
    }
}

/// Caller's handle to a submitted task; resolves exactly once with the
/// task's terminal result.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(SchedulerError::Abandoned)))
    }
}
