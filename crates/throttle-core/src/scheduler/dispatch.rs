//! Dispatcher: queue/active-set accounting, pacing, completion and retry.
//!
//! All scheduler state lives in one `State` behind one mutex. Operations run
//! in spawned Tokio tasks, up to `max_concurrent` at once; only their
//! bookkeeping goes through the lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::observability::{LogRecord, ObservabilitySink, RetryOutcome};
use crate::retry::{BackoffPolicy, ErrorClassifier, OperationError, RetryDecision, SchedulerError};

use super::guard::ActiveSlot;
use super::queue::TaskQueue;
use super::task::{Task, TaskState};

pub(super) struct State<T> {
    pub(super) queue: TaskQueue<Task<T>>,
    /// Size of the active set.
    pub(super) active: usize,
    /// Tasks waiting out a backoff delay (neither queued nor active).
    pub(super) retry_scheduled: usize,
    /// Start instant handed to the most recently dispatched task.
    last_start: Option<Instant>,
    /// Highest priority any caller has submitted with.
    priority_ceiling: Option<i32>,
}

impl<T> State<T> {
    fn new() -> Self {
        Self {
            queue: TaskQueue::new(),
            active: 0,
            retry_scheduled: 0,
            last_start: None,
            priority_ceiling: None,
        }
    }

    /// Earliest start for the next dispatched task: at least `spacing` after
    /// dispatch and at least `spacing` after the previous start.
    fn reserve_start(&mut self, now: Instant, spacing: Duration) -> Instant {
        let mut start = now + spacing;
        if let Some(prev) = self.last_start {
            start = start.max(prev + spacing);
        }
        self.last_start = Some(start);
        start
    }

    pub(super) fn observe_priority(&mut self, priority: i32) {
        self.priority_ceiling = Some(self.priority_ceiling.map_or(priority, |c| c.max(priority)));
    }

    /// Retry bump: +1, but never above the highest submitted priority (a task
    /// already above it keeps its own priority).
    pub(super) fn bumped_priority(&self, priority: i32) -> i32 {
        let cap = self.priority_ceiling.map_or(priority, |c| c.max(priority));
        priority.saturating_add(1).min(cap)
    }
}

pub(crate) struct Shared<T> {
    pub(super) config: SchedulerConfig,
    classifier: ErrorClassifier,
    backoff: BackoffPolicy,
    sink: Arc<dyn ObservabilitySink>,
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> Shared<T> {
    pub(super) fn new(config: SchedulerConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            classifier: ErrorClassifier::new(&config.retryable_signatures),
            backoff: BackoffPolicy::from_config(&config),
            config,
            sink,
            state: Mutex::new(State::new()),
        }
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a new task and start whatever fits.
    pub(super) fn enqueue(self: &Arc<Self>, task: Task<T>) {
        let mut state = self.lock();
        state.observe_priority(task.priority);
        tracing::trace!(
            task = %task.name,
            priority = task.priority,
            queued = state.queue.len() + 1,
            "task queued"
        );
        state.queue.push(task.priority, task);
        self.pump(&mut state);
    }

    /// Move tasks from the queue into the active set while there is room.
    fn pump(self: &Arc<Self>, state: &mut State<T>) {
        if state.queue.is_empty() || state.active >= self.config.max_concurrent {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(
                queued = state.queue.len(),
                "no Tokio runtime available; tasks stay queued"
            );
            return;
        };
        let spacing = self.config.delay_between_requests();
        while state.active < self.config.max_concurrent {
            let Some((priority, seq, mut task)) = state.queue.pop() else {
                break;
            };
            task.priority = priority;
            task.seq = seq;
            task.transition(TaskState::Running);
            state.active += 1;
            let start_at = state.reserve_start(Instant::now(), spacing);
            tracing::trace!(
                task = %task.name,
                priority,
                attempt = task.attempt,
                active = state.active,
                "task dispatched"
            );
            runtime.spawn(run_task(Arc::clone(self), task, start_at));
        }
    }

    pub(super) fn release_slot(self: &Arc<Self>) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        self.pump(&mut state);
    }

    /// Handle the outcome of one attempt.
    fn complete(self: &Arc<Self>, mut task: Task<T>, result: Result<T, OperationError>) {
        let err = match result {
            Ok(value) => {
                task.transition(TaskState::Succeeded);
                if task.attempt > 0 {
                    self.emit(LogRecord::new(
                        task.name.clone(),
                        task.correlation_id.clone(),
                        RetryOutcome::SuccessAfterRetry,
                        task.attempt + 1,
                        task.last_error.as_ref().map(|e| e.to_string()),
                    ));
                }
                task.settle(Ok(value));
                return;
            }
            Err(err) => err,
        };

        let kind = self.classifier.classify(&err);
        let max_retries = task.max_retries.unwrap_or(self.config.max_retries);
        match self.backoff.decide(task.attempt, kind, max_retries) {
            RetryDecision::Permanent => self.fail(task, SchedulerError::Permanent(err)),
            RetryDecision::Exhausted => {
                let attempts = task.attempt + 1;
                self.fail(task, SchedulerError::RetriesExhausted { attempts, last: err });
            }
            RetryDecision::RetryAfter(delay) => self.schedule_retry(task, err, delay),
        }
    }

    fn fail(&self, mut task: Task<T>, error: SchedulerError) {
        task.transition(TaskState::Failed);
        tracing::debug!(
            task = %task.name,
            correlation_id = task.correlation_id.as_deref().unwrap_or("-"),
            attempts = task.attempt + 1,
            error = %error,
            "task failed"
        );
        if task.attempt > 0 {
            self.emit(LogRecord::new(
                task.name.clone(),
                task.correlation_id.clone(),
                RetryOutcome::FailedAfterRetries,
                task.attempt + 1,
                error.operation_error().map(|e| e.to_string()),
            ));
        }
        task.settle(Err(error));
    }

    fn schedule_retry(self: &Arc<Self>, mut task: Task<T>, err: OperationError, delay: Duration) {
        task.transition(TaskState::RetryScheduled);
        tracing::debug!(
            task = %task.name,
            correlation_id = task.correlation_id.as_deref().unwrap_or("-"),
            attempt = task.attempt + 1,
            delay_ms = millis(delay),
            error = %err,
            "transient failure; retry scheduled"
        );
        task.last_error = Some(err);
        task.attempt += 1;
        {
            let mut state = self.lock();
            state.retry_scheduled += 1;
            task.priority = state.bumped_priority(task.priority);
        }
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.requeue(task);
        });
    }

    /// Backoff elapsed: put the task back in the queue. A `clear` that ran
    /// meanwhile does not affect it; the task was never in the queue.
    fn requeue(self: &Arc<Self>, mut task: Task<T>) {
        let mut state = self.lock();
        state.retry_scheduled = state.retry_scheduled.saturating_sub(1);
        task.transition(TaskState::Queued);
        let (priority, seq) = (task.priority, task.seq);
        state.queue.push_with_seq(priority, seq, task);
        self.pump(&mut state);
    }

    /// Reject every queued task; returns how many were rejected.
    pub(super) fn clear(&self) -> usize {
        let drained = self.lock().queue.drain();
        let cancelled = drained.len();
        for mut task in drained {
            task.transition(TaskState::Cancelled);
            task.settle(Err(SchedulerError::Cancelled));
        }
        tracing::info!(cancelled, "cleared queued tasks");
        cancelled
    }

    fn emit(&self, record: LogRecord) {
        if let Err(e) = self.sink.record(&record) {
            tracing::warn!(
                operation = %record.operation_name,
                error = %e,
                "observability sink failed; record dropped"
            );
        }
    }
}

/// Whole milliseconds of `d` for log fields, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Body of a dispatched task: wait for its pacing slot, run one attempt,
/// settle or schedule a retry, then free the slot.
///
/// The slot guard is created on first poll. A future dropped unpolled (spawn
/// during runtime shutdown) must not re-enter the dispatcher lock that
/// `pump` is still holding.
async fn run_task<T: Send + 'static>(shared: Arc<Shared<T>>, task: Task<T>, start_at: Instant) {
    let slot = ActiveSlot {
        shared: Arc::clone(&shared),
    };
    if start_at > Instant::now() {
        tokio::time::sleep_until(start_at).await;
    }
    debug_assert_eq!(task.state(), TaskState::Running);
    let result = (task.operation)().await;
    shared.complete(task, result);
    drop(slot);
}
