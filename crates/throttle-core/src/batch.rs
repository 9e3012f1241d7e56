//! Backlog sweeps: re-submit pending/failed units through the scheduler in
//! fixed-size batches and count the outcomes.
//!
//! Within a batch every item is submitted at once and the batch waits for all
//! of them (one failure never aborts its siblings). Spacing between individual
//! calls is the scheduler's job; the runner only pauses between batches.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::config::{BatchConfig, ConfigError};
use crate::retry::OperationError;
use crate::scheduler::{Scheduler, TaskHandle, TaskOptions};

/// One externally identified unit needing the operation (e.g. a vehicle
/// image lacking an analysis marker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogItem<P> {
    pub id: String,
    pub payload: P,
}

/// Source of backlog items.
pub trait BacklogSelector {
    type Payload: Send + Sync + 'static;

    /// Current backlog, at most `limit` items.
    fn select(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<BacklogItem<Self::Payload>>>> + Send;
}

/// A fixed, in-memory backlog.
impl<P> BacklogSelector for Vec<BacklogItem<P>>
where
    P: Clone + Send + Sync + 'static,
{
    type Payload = P;

    fn select(&self, limit: usize) -> impl Future<Output = Result<Vec<BacklogItem<P>>>> + Send {
        let items: Vec<_> = self.iter().take(limit).cloned().collect();
        async move { Ok(items) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Aggregate outcome of one backlog sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

pub struct BatchRunner<'a, T> {
    scheduler: &'a Scheduler<T>,
    config: BatchConfig,
    operation_name: String,
}

impl<'a, T: Send + 'static> BatchRunner<'a, T> {
    pub fn new(scheduler: &'a Scheduler<T>, config: BatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scheduler,
            config,
            operation_name: "backlog_item".to_string(),
        })
    }

    /// Name recorded in log records for items of this sweep.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = name.into();
        self
    }

    /// Sweep the backlog once. Fails only if the backlog cannot be fetched;
    /// item failures are counted in the summary.
    pub async fn run_backlog<S, F, Fut>(&self, selector: &S, processor: F) -> Result<BatchSummary>
    where
        S: BacklogSelector,
        F: Fn(Arc<BacklogItem<S::Payload>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        let items: Vec<Arc<BacklogItem<S::Payload>>> = selector
            .select(self.config.fetch_limit)
            .await
            .context("fetch backlog")?
            .into_iter()
            .map(Arc::new)
            .collect();

        let batch_size = self.config.batch_size.max(1);
        let batch_count = items.len().div_ceil(batch_size);
        tracing::info!(
            operation = %self.operation_name,
            items = items.len(),
            batches = batch_count,
            "backlog sweep started"
        );

        let processor = Arc::new(processor);
        let mut summary = BatchSummary::default();
        for (index, batch) in items.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let handles: Vec<(String, TaskHandle<T>)> = batch
                .iter()
                .map(|item| {
                    let id = item.id.clone();
                    let options = TaskOptions::new(self.operation_name.clone())
                        .priority(self.config.priority)
                        .correlation_id(id.clone())
                        .max_retries(self.config.max_retries_per_item);
                    let item = Arc::clone(item);
                    let processor = Arc::clone(&processor);
                    let handle = self
                        .scheduler
                        .submit_with(options, move || processor(Arc::clone(&item)));
                    (id, handle)
                })
                .collect();

            let mut batch_ok = 0usize;
            for (id, handle) in handles {
                summary.processed += 1;
                match handle.await {
                    Ok(_) => {
                        summary.successful += 1;
                        batch_ok += 1;
                    }
                    Err(e) => {
                        tracing::debug!(id = %id, error = %e, "backlog item failed");
                        summary.failed += 1;
                        summary.failures.push(BatchFailure {
                            id,
                            error: e.to_string(),
                        });
                    }
                }
            }
            tracing::debug!(
                batch = index + 1,
                of = batch_count,
                ok = batch_ok,
                failed = batch.len() - batch_ok,
                "batch settled"
            );
        }

        tracing::info!(
            operation = %self.operation_name,
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            "backlog sweep finished"
        );
        Ok(summary)
    }
}
