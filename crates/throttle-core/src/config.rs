use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default retryable signatures: throttling/unavailable status codes and the
/// message fragments rate-limited providers tend to return.
pub const DEFAULT_RETRYABLE_SIGNATURES: &[&str] = &[
    "429",
    "503",
    "504",
    "rate limit",
    "timeout",
    "network error",
    "service unavailable",
];

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("base_delay_ms must be greater than 0")]
    ZeroBaseDelay,
    #[error("max_delay_ms ({max}) must not be below base_delay_ms ({base})")]
    MaxDelayBelowBase { base: u64, max: u64 },
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,
}

/// Scheduler parameters (`[scheduler]` section in config.toml).
///
/// Fixed at construction time; the scheduler never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of operations executing at once.
    pub max_concurrent: usize,
    /// Minimum spacing between two operation starts, in milliseconds.
    pub delay_between_requests_ms: u64,
    /// Double the delay on every retry instead of using a constant delay.
    pub exponential_backoff: bool,
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Optional upper bound on a single backoff delay (None = unbounded).
    pub max_delay_ms: Option<u64>,
    /// Status codes or message fragments that mark a failure as transient.
    pub retryable_signatures: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            delay_between_requests_ms: 1000,
            exponential_backoff: true,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: None,
            retryable_signatures: DEFAULT_RETRYABLE_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.base_delay_ms == 0 {
            return Err(ConfigError::ZeroBaseDelay);
        }
        if let Some(max) = self.max_delay_ms {
            if max < self.base_delay_ms {
                return Err(ConfigError::MaxDelayBelowBase {
                    base: self.base_delay_ms,
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn delay_between_requests(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }
}

/// Backlog sweep parameters (`[batch]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items submitted together; the next batch starts once all have settled.
    pub batch_size: usize,
    /// Upper bound on backlog items fetched per sweep.
    pub fetch_limit: usize,
    /// Pause between consecutive batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Retry budget for each backlog item (overrides the scheduler's max_retries).
    pub max_retries_per_item: u32,
    /// Priority used when submitting backlog items.
    pub priority: i32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            fetch_limit: 100,
            batch_delay_ms: 2000,
            max_retries_per_item: 3,
            priority: 0,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Global configuration loaded from `~/.config/throttle/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ThrottleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.batch.validate()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("throttle")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load and validate configuration from an explicit path.
pub fn load_from_path(path: &Path) -> Result<ThrottleConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: ThrottleConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ThrottleConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ThrottleConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}
