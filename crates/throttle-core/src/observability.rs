//! Structured records of retry outcomes and the sinks that receive them.
//!
//! The scheduler hands a `LogRecord` to its sink whenever a task reaches a
//! terminal state after at least one retry. Where the record ends up (a
//! database table, a file, the tracing log) is the sink's business; sink
//! failures are logged and swallowed so they never fail the operation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Terminal outcome of a task that was retried at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    SuccessAfterRetry,
    FailedAfterRetries,
}

/// One retry outcome, as handed to an `ObservabilitySink`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub operation_name: String,
    pub correlation_id: Option<String>,
    pub status: RetryOutcome,
    /// Total executions of the operation, including the first.
    pub attempts: u32,
    /// Last failure message (for successes, the failure that was recovered from).
    pub error_message: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl LogRecord {
    pub fn new(
        operation_name: impl Into<String>,
        correlation_id: Option<String>,
        status: RetryOutcome,
        attempts: u32,
        error_message: Option<String>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            correlation_id,
            status,
            attempts,
            error_message,
            timestamp_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Receiver of retry outcome records.
///
/// `record` is called synchronously from the Tokio worker that settled the
/// task, outside the scheduler lock. It should return quickly: a sink that
/// blocks (file or database I/O) stalls that worker for the duration.
/// [`JsonLinesSink`] does blocking writes; for long runs, collect into a
/// [`MemorySink`] and flush afterwards.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, record: &LogRecord) -> Result<()>;
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, record: &LogRecord) -> Result<()> {
        let correlation_id = record.correlation_id.as_deref().unwrap_or("-");
        let error = record.error_message.as_deref().unwrap_or("-");
        match record.status {
            RetryOutcome::SuccessAfterRetry => tracing::info!(
                operation = %record.operation_name,
                correlation_id,
                attempts = record.attempts,
                error,
                "operation succeeded after retry"
            ),
            RetryOutcome::FailedAfterRetries => tracing::warn!(
                operation = %record.operation_name,
                correlation_id,
                attempts = record.attempts,
                error,
                "operation failed after retries"
            ),
        }
        Ok(())
    }
}

/// Keeps records in memory; useful for summaries and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record received so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ObservabilitySink for MemorySink {
    fn record(&self, record: &LogRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

/// Appends each record as one JSON line to a file. Writes block.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create record dir {}", parent.display()))?;
            }
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open record file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObservabilitySink for JsonLinesSink {
    fn record(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("record file lock poisoned"))?;
        file.write_all(&line)
            .with_context(|| format!("append record to {}", self.path.display()))?;
        Ok(())
    }
}
