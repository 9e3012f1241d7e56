//! Integration tests: scheduler concurrency, ordering, retry and cancellation.
//!
//! All tests run on a paused Tokio clock, so backoff and pacing delays are
//! observed exactly without real waiting.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::fake_service::{self, wait_open, AttemptLog, ConcurrencyProbe, Gate, OrderLog};
use throttle_core::observability::{LogRecord, ObservabilitySink};
use throttle_core::{OperationError, RetryOutcome, Scheduler, SchedulerError, TaskOptions};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn active_set_never_exceeds_max_concurrent() {
    let (scheduler, _sink) = fake_service::scheduler::<usize>(fake_service::config(3, 0));
    let probe = Arc::new(ConcurrencyProbe::default());

    let mut handles = Vec::new();
    for i in 0..20usize {
        let probe = Arc::clone(&probe);
        let observer = scheduler.clone();
        handles.push(scheduler.submit(move || {
            let probe = Arc::clone(&probe);
            let observer = observer.clone();
            async move {
                let _inside = probe.enter();
                assert!(observer.status().active_count <= 3);
                tokio::time::sleep(Duration::from_millis(10 * (i as u64 % 4 + 1))).await;
                Ok(i)
            }
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await, Ok(i));
    }
    assert_eq!(probe.peak(), 3);
    let status = scheduler.status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.max_concurrent, 3);
}

#[tokio::test(start_paused = true)]
async fn always_transient_failure_is_attempted_max_retries_plus_one_times() {
    let (scheduler, sink) = fake_service::scheduler::<()>(fake_service::config(1, 3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
        .submit_with(
            TaskOptions::new("analyze_image").correlation_id("vehicle-9"),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(OperationError::with_status(429, "Too Many Requests")) }
            },
        )
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    match result {
        Err(SchedulerError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert_eq!(last.status(), Some(429));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RetryOutcome::FailedAfterRetries);
    assert_eq!(records[0].attempts, 4);
    assert_eq!(records[0].operation_name, "analyze_image");
    assert_eq!(records[0].correlation_id.as_deref(), Some("vehicle-9"));
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("HTTP 429: Too Many Requests")
    );
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_attempted_once_without_backoff() {
    let (scheduler, sink) = fake_service::scheduler::<()>(fake_service::config(1, 3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let start = Instant::now();
    let result = scheduler
        .submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(OperationError::new("invalid VIN in payload")) }
        })
        .await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        result,
        Err(SchedulerError::Permanent(OperationError::new(
            "invalid VIN in payload"
        )))
    );
    assert!(sink.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn higher_priority_is_dispatched_first() {
    let (scheduler, _sink) = fake_service::scheduler::<()>(fake_service::config(1, 0));
    let gate = Gate::new();
    let order = OrderLog::default();

    let rx = gate.receiver();
    let blocker = scheduler.submit(move || wait_open_ok(rx.clone()));

    let mut handles = Vec::new();
    for (label, priority) in [("low", 1), ("high", 5)] {
        let order = order.clone();
        handles.push(scheduler.submit_with(
            TaskOptions::new(label).priority(priority),
            move || {
                order.push(label);
                async { Ok(()) }
            },
        ));
    }
    assert_eq!(scheduler.status().queue_length, 2);

    gate.open();
    blocker.await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(order.labels(), vec!["high", "low"]);
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_delays_grow_from_base() {
    let (scheduler, _sink) = fake_service::scheduler::<()>(fake_service::config(1, 3));
    let log = Arc::new(AttemptLog::default());

    let attempts = Arc::clone(&log);
    let result = scheduler
        .submit(move || {
            attempts.record();
            async { Err(OperationError::with_status(503, "service unavailable")) }
        })
        .await;

    assert!(matches!(
        result,
        Err(SchedulerError::RetriesExhausted { attempts: 4, .. })
    ));
    let gaps = log.gaps();
    assert_eq!(gaps.len(), 3);
    assert!(gaps[0] >= Duration::from_millis(1000));
    assert!(gaps[1] >= Duration::from_millis(2000));
    assert!(gaps[2] >= Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn constant_backoff_uses_base_delay() {
    let mut cfg = fake_service::config(1, 2);
    cfg.exponential_backoff = false;
    cfg.base_delay_ms = 300;
    let (scheduler, _sink) = fake_service::scheduler::<()>(cfg);
    let log = Arc::new(AttemptLog::default());

    let attempts = Arc::clone(&log);
    let _ = scheduler
        .submit(move || {
            attempts.record();
            async { Err(OperationError::new("network error: connection reset")) }
        })
        .await;

    assert_eq!(
        log.gaps(),
        vec![Duration::from_millis(300), Duration::from_millis(300)]
    );
}

#[tokio::test(start_paused = true)]
async fn clear_rejects_only_queued_tasks() {
    let (scheduler, _sink) = fake_service::scheduler::<&'static str>(fake_service::config(2, 0));
    let gate = Gate::new();
    let ran = Arc::new(AtomicU32::new(0));

    let mut active = Vec::new();
    for _ in 0..2 {
        let rx = gate.receiver();
        active.push(scheduler.submit(move || {
            let rx = rx.clone();
            async move {
                wait_open(rx).await;
                Ok("finished")
            }
        }));
    }
    let mut queued = Vec::new();
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        queued.push(scheduler.submit(move || {
            ran.fetch_add(1, Ordering::SeqCst);
            async { Ok("should not run") }
        }));
    }

    let status = scheduler.status();
    assert_eq!(status.active_count, 2);
    assert_eq!(status.queue_length, 3);

    assert_eq!(scheduler.clear(), 3);
    assert_eq!(scheduler.status().queue_length, 0);
    for handle in queued {
        assert_eq!(handle.await, Err(SchedulerError::Cancelled));
    }

    gate.open();
    for handle in active {
        assert_eq!(handle.await, Ok("finished"));
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn clear_leaves_task_waiting_out_backoff_to_retry() {
    let (scheduler, sink) = fake_service::scheduler::<()>(fake_service::config(1, 3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let handle = scheduler.submit(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(OperationError::new("rate limit exceeded"))
            } else {
                Ok(())
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(scheduler.status().retry_scheduled, 1);
    assert_eq!(scheduler.clear(), 0);

    assert_eq!(handle.await, Ok(()));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.status().retry_scheduled, 0);
    assert_eq!(sink.records()[0].status, RetryOutcome::SuccessAfterRetry);
}

#[tokio::test(start_paused = true)]
async fn equal_priority_tasks_complete_in_submission_order() {
    let (scheduler, _sink) = fake_service::scheduler::<usize>(fake_service::config(2, 0));
    let probe = Arc::new(ConcurrencyProbe::default());
    let order = OrderLog::default();

    let mut handles = Vec::new();
    for i in 0..5usize {
        let probe = Arc::clone(&probe);
        let order = order.clone();
        handles.push(scheduler.submit(move || {
            let probe = Arc::clone(&probe);
            let order = order.clone();
            async move {
                let _inside = probe.enter();
                tokio::task::yield_now().await;
                order.push(i.to_string());
                Ok(i)
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert!(probe.peak() <= 2);
    assert_eq!(order.labels(), vec!["0", "1", "2", "3", "4"]);
}

#[tokio::test(start_paused = true)]
async fn pacing_delay_spaces_operation_starts() {
    let mut cfg = fake_service::config(3, 0);
    cfg.delay_between_requests_ms = 100;
    let (scheduler, _sink) = fake_service::scheduler::<()>(cfg);
    let log = Arc::new(AttemptLog::default());

    let submitted = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let log = Arc::clone(&log);
        handles.push(scheduler.submit(move || {
            log.record();
            async { Ok(()) }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(submitted.elapsed(), Duration::from_millis(300));
    for gap in log.gaps() {
        assert!(gap >= Duration::from_millis(100));
    }
}

#[tokio::test(start_paused = true)]
async fn recovered_task_reports_success_after_retry() {
    let (scheduler, sink) = fake_service::scheduler::<&'static str>(fake_service::config(1, 3));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
        .submit_with(
            TaskOptions::new("scrape_listing").correlation_id("lot-17"),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(OperationError::new("Gateway Timeout"))
                    } else {
                        Ok("listing html")
                    }
                }
            },
        )
        .await;

    assert_eq!(result, Ok("listing html"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RetryOutcome::SuccessAfterRetry);
    assert_eq!(records[0].attempts, 3);
    assert_eq!(records[0].correlation_id.as_deref(), Some("lot-17"));
    assert_eq!(records[0].error_message.as_deref(), Some("Gateway Timeout"));
}

#[tokio::test(start_paused = true)]
async fn first_try_success_emits_no_record() {
    let (scheduler, sink) = fake_service::scheduler::<u8>(fake_service::config(1, 3));
    assert_eq!(scheduler.submit(|| async { Ok(1) }).await, Ok(1));
    assert!(sink.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn per_task_retry_budget_overrides_config() {
    let (scheduler, sink) = fake_service::scheduler::<()>(fake_service::config(1, 5));
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
        .submit_with(TaskOptions::default().max_retries(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(OperationError::with_status(504, "")) }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(result.unwrap_err().attempts(), 2);
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retried_task_keeps_its_place_ahead_of_later_equal_priority_work() {
    let mut cfg = fake_service::config(1, 3);
    cfg.base_delay_ms = 10;
    let (scheduler, _sink) = fake_service::scheduler::<()>(cfg);
    let order = OrderLog::default();
    let attempts = Arc::new(AtomicU32::new(0));

    let flaky = {
        let order = order.clone();
        let attempts = Arc::clone(&attempts);
        scheduler.submit(move || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            order.push(format!("flaky#{}", n));
            async move {
                if n == 0 {
                    Err(OperationError::new("rate limit"))
                } else {
                    Ok(())
                }
            }
        })
    };
    let mut slow = Vec::new();
    for label in ["b", "c"] {
        let order = order.clone();
        slow.push(scheduler.submit(move || {
            order.push(label);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }
        }));
    }

    flaky.await.unwrap();
    for handle in slow {
        handle.await.unwrap();
    }
    assert_eq!(order.labels(), vec!["flaky#0", "b", "flaky#1", "c"]);
}

#[tokio::test(start_paused = true)]
async fn repeatedly_retried_task_never_outranks_later_high_priority_work() {
    let mut cfg = fake_service::config(1, 20);
    cfg.exponential_backoff = false;
    cfg.base_delay_ms = 100;
    let (scheduler, _sink) = fake_service::scheduler::<()>(cfg);
    let order = OrderLog::default();
    let gate = Gate::new();

    // Fails at t = 0, 100, ..., 800; an uncapped bump would reach priority 9.
    let attempts = Arc::new(AtomicU32::new(0));
    let flaky = {
        let order = order.clone();
        let attempts = Arc::clone(&attempts);
        scheduler.submit(move || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            order.push(format!("flaky#{}", n));
            async move {
                if n < 10 {
                    Err(OperationError::with_status(503, ""))
                } else {
                    Ok(())
                }
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(850)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 9);

    let holder = {
        let order = order.clone();
        let rx = gate.receiver();
        scheduler.submit(move || {
            order.push("holder");
            wait_open_ok(rx.clone())
        })
    };
    // Flaky re-enters the queue at t = 900 behind the held slot.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let urgent = {
        let order = order.clone();
        scheduler.submit_with(TaskOptions::new("urgent").priority(5), move || {
            order.push("urgent");
            async { Ok(()) }
        })
    };
    assert_eq!(scheduler.status().queue_length, 2);

    gate.open();
    holder.await.unwrap();
    urgent.await.unwrap();
    flaky.await.unwrap();

    let labels = order.labels();
    assert_eq!(labels[9], "holder");
    assert_eq!(labels[10], "urgent");
    assert_eq!(labels[11], "flaky#9");
}

#[tokio::test(start_paused = true)]
async fn panicking_operation_frees_its_slot() {
    let (scheduler, _sink) = fake_service::scheduler::<u8>(fake_service::config(1, 0));

    let doomed = scheduler.submit(|| async { panic!("scraper crashed") });
    let next = scheduler.submit(|| async { Ok(2) });

    assert_eq!(doomed.await, Err(SchedulerError::Abandoned));
    assert_eq!(next.await, Ok(2));
    assert_eq!(scheduler.status().active_count, 0);
}

struct FailingSink;

impl ObservabilitySink for FailingSink {
    fn record(&self, _record: &LogRecord) -> anyhow::Result<()> {
        anyhow::bail!("logs table unavailable")
    }
}

#[tokio::test(start_paused = true)]
async fn sink_failure_does_not_fail_the_task() {
    let scheduler: Scheduler<u8> =
        Scheduler::new(fake_service::config(1, 3), Arc::new(FailingSink)).unwrap();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
        .submit(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(OperationError::with_status(429, ""))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
    assert_eq!(result, Ok(7));
}

#[test]
fn invalid_config_is_rejected() {
    let cfg = fake_service::config(0, 3);
    assert!(Scheduler::<()>::with_tracing(cfg).is_err());
}

fn wait_open_ok(
    rx: tokio::sync::watch::Receiver<bool>,
) -> impl std::future::Future<Output = Result<(), OperationError>> {
    async move {
        wait_open(rx).await;
        Ok(())
    }
}
