pub mod config;
pub mod logging;

pub mod batch;
pub mod observability;
pub mod operation;
pub mod retry;
pub mod scheduler;

pub use batch::{BacklogItem, BacklogSelector, BatchRunner, BatchSummary};
pub use config::{BatchConfig, SchedulerConfig, ThrottleConfig};
pub use observability::{LogRecord, ObservabilitySink, RetryOutcome};
pub use retry::{OperationError, SchedulerError};
pub use scheduler::{Scheduler, SchedulerStatus, TaskHandle, TaskOptions};
