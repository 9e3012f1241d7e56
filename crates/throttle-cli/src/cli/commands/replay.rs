//! `throttle replay <file>` – run a scripted backlog through the scheduler.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use throttle_core::observability::{JsonLinesSink, MemorySink};
use throttle_core::{
    BatchRunner, BatchSummary, LogRecord, ObservabilitySink, Scheduler, ThrottleConfig,
};

use crate::cli::replay_file;

#[derive(Debug, Clone)]
pub struct ReplayArgs {
    pub file: PathBuf,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub records: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    summary: BatchSummary,
    records: Vec<LogRecord>,
}

/// Apply command-line overrides on top of the loaded config.
pub(crate) fn effective_config(cfg: &ThrottleConfig, args: &ReplayArgs) -> ThrottleConfig {
    let mut cfg = cfg.clone();
    if let Some(n) = args.batch_size {
        cfg.batch.batch_size = n;
    }
    if let Some(n) = args.max_retries {
        cfg.batch.max_retries_per_item = n;
    }
    cfg
}

pub async fn run_replay(cfg: &ThrottleConfig, args: &ReplayArgs) -> Result<()> {
    let cfg = effective_config(cfg, args);
    cfg.validate().context("invalid replay configuration")?;
    let backlog = replay_file::load(&args.file)?;

    // Records are buffered in memory during the sweep; the file sink blocks.
    let memory = Arc::new(MemorySink::new());
    let scheduler: Scheduler<String> =
        Scheduler::new(cfg.scheduler.clone(), Arc::clone(&memory) as Arc<dyn ObservabilitySink>)?;
    let runner = BatchRunner::new(&scheduler, cfg.batch.clone())?.operation_name("replay");

    let summary = runner.run_backlog(&backlog, replay_file::attempt).await?;
    let records = memory.records();

    if let Some(path) = &args.records {
        let file_sink = JsonLinesSink::open(path)?;
        for record in &records {
            file_sink.record(record)?;
        }
        tracing::info!(path = %file_sink.path().display(), count = records.len(), "wrote retry records");
    }

    if args.json {
        let report = ReplayReport { summary, records };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&summary, &records);
    }
    Ok(())
}

fn print_report(summary: &BatchSummary, records: &[LogRecord]) {
    println!(
        "processed {}  successful {}  failed {}",
        summary.processed, summary.successful, summary.failed
    );
    if !summary.failures.is_empty() {
        println!();
        println!("{:<20} {}", "ID", "ERROR");
        for f in &summary.failures {
            println!("{:<20} {}", f.id, f.error);
        }
    }
    if !records.is_empty() {
        println!();
        println!("{:<20} {:<22} {:>8} {}", "ID", "OUTCOME", "ATTEMPTS", "LAST ERROR");
        for r in records {
            let outcome = serde_json::to_value(r.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            println!(
                "{:<20} {:<22} {:>8} {}",
                r.correlation_id.as_deref().unwrap_or("-"),
                outcome,
                r.attempts,
                r.error_message.as_deref().unwrap_or("-")
            );
        }
    }
}
