//! Scripted backlog file used by `throttle replay`.
//!
//! ```json
//! [
//!   { "id": "vehicle-1", "steps": ["ok"] },
//!   { "id": "vehicle-2", "steps": [{ "status": 429 }, "ok"], "latency_ms": 150 },
//!   { "id": "vehicle-3", "steps": [{ "error": "unsupported image format" }] }
//! ]
//! ```
//!
//! Each attempt consumes the next step; the last step repeats.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use throttle_core::{BacklogItem, OperationError};

/// Outcome of one scripted attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Ok,
    Status(u32),
    Error(String),
}

impl Step {
    fn outcome(&self, id: &str) -> Result<String, OperationError> {
        match self {
            Step::Ok => Ok(format!("{} done", id)),
            Step::Status(code) => Err(OperationError::with_status(*code, "")),
            Step::Error(message) => Err(OperationError::new(message.clone())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub latency_ms: u64,
    /// Attempts made so far; shared by clones of the item.
    #[serde(skip)]
    attempts: Arc<AtomicUsize>,
}

impl Script {
    /// Outcome and latency of the next attempt.
    pub fn next_attempt(&self) -> (Step, Duration) {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .get(n)
            .or_else(|| self.steps.last())
            .cloned()
            .unwrap_or(Step::Ok);
        (step, Duration::from_millis(self.latency_ms))
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    #[serde(flatten)]
    script: Script,
}

pub fn parse(data: &str) -> Result<Vec<BacklogItem<Script>>> {
    let entries: Vec<Entry> = serde_json::from_str(data)?;
    Ok(entries
        .into_iter()
        .map(|e| BacklogItem {
            id: e.id,
            payload: e.script,
        })
        .collect())
}

pub fn load(path: &Path) -> Result<Vec<BacklogItem<Script>>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read backlog file {}", path.display()))?;
    parse(&data).with_context(|| format!("parse backlog file {}", path.display()))
}

/// Run one scripted attempt for `item`.
pub async fn attempt(item: Arc<BacklogItem<Script>>) -> Result<String, OperationError> {
    let (step, latency) = item.payload.next_attempt();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    step.outcome(&item.id)
}
