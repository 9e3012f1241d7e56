//! Instrumented stand-ins for a rate-limited external service.
//!
//! `ConcurrencyProbe` tracks how many calls are inside the service at once,
//! `Gate` holds calls until the test opens it, and `AttemptLog` records when
//! each attempt started (paused Tokio time makes those instants exact).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use throttle_core::config::SchedulerConfig;
use throttle_core::observability::MemorySink;
use throttle_core::Scheduler;
use tokio::sync::watch;
use tokio::time::Instant;

/// Scheduler config with no pacing and a 1s base delay.
pub fn config(max_concurrent: usize, max_retries: u32) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent,
        delay_between_requests_ms: 0,
        exponential_backoff: true,
        max_retries,
        base_delay_ms: 1000,
        ..SchedulerConfig::default()
    }
}

pub fn scheduler<T: Send + 'static>(cfg: SchedulerConfig) -> (Scheduler<T>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let scheduler = Scheduler::new(cfg, sink.clone()).expect("valid config");
    (scheduler, sink)
}

#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

pub struct ProbeGuard<'a>(&'a ConcurrencyProbe);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyProbe {
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Holds operations until opened.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

pub async fn wait_open(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|open| *open).await;
}

/// Start instants of every attempt, in order.
#[derive(Default)]
pub struct AttemptLog {
    starts: Mutex<Vec<Instant>>,
}

impl AttemptLog {
    pub fn record(&self) -> usize {
        let mut starts = self.starts.lock().unwrap();
        starts.push(Instant::now());
        starts.len()
    }

    pub fn count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    /// Gaps between consecutive attempt starts.
    pub fn gaps(&self) -> Vec<Duration> {
        let starts = self.starts.lock().unwrap();
        starts.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Ordered record of labels (dispatch or completion order).
#[derive(Default, Clone)]
pub struct OrderLog {
    labels: Arc<Mutex<Vec<String>>>,
}

impl OrderLog {
    pub fn push(&self, label: impl Into<String>) {
        self.labels.lock().unwrap().push(label.into());
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}
