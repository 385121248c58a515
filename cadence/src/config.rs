//! Scheduler configuration.
//!
//! Every struct here deserializes from TOML with all fields optional, so a config file only needs
//! to mention what it changes:
//!
//! ```
//! # use cadence::config::SchedulerConfig;
//! let config = SchedulerConfig::from_toml_str(
//!     r#"
//!     max_concurrent_jobs = 5
//!
//!     [retry]
//!     base_delay_ms = 1000
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.max_concurrent_jobs, 5);
//! assert_eq!(config.retry.max_retries, 3);
//! ```
use std::{path::PathBuf, time::Duration};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    backoff::{BackoffStrategy, Exponential, Jitter},
    logger::LogLevel,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to parse configuration")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for [`crate::ContentScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of publishes in flight at once.
    pub max_concurrent_jobs: usize,
    /// How often the timer runs a processing cycle.
    pub processing_interval_ms: u64,
    /// Items processing for longer than this are considered stuck and reset.
    pub stuck_timeout_minutes: u32,
    /// How long `stop` waits for in-flight jobs before giving up.
    pub stop_timeout_ms: u64,
    /// How long `force_process` waits for in-flight jobs.
    pub force_process_timeout_ms: u64,
    /// How often the drain loops of `stop` and `force_process` check for in-flight jobs.
    pub drain_poll_interval_ms: u64,
    /// Number of completed and failed items kept for introspection.
    pub history_capacity: usize,
    /// Health checks report an issue when more error entries than this were logged in the
    /// last hour.
    pub max_recent_errors: usize,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            processing_interval_ms: 60_000,
            stuck_timeout_minutes: 30,
            stop_timeout_ms: 30_000,
            force_process_timeout_ms: 60_000,
            drain_poll_interval_ms: 100,
            history_capacity: 1000,
            max_recent_errors: 10,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document and validates the result.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be at least 1".to_owned(),
            ));
        }
        if self.processing_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "processing_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.drain_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "drain_poll_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_owned(),
            ));
        }
        self.retry.validate()?;
        self.logging.validate()
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_processing_interval(mut self, interval: Duration) -> Self {
        self.processing_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_force_process_timeout(mut self, timeout: Duration) -> Self {
        self.force_process_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stuck_timeout_minutes(mut self, minutes: u32) -> Self {
        self.stuck_timeout_minutes = minutes;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn force_process_timeout(&self) -> Duration {
        Duration::from_millis(self.force_process_timeout_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn stuck_timeout(&self) -> TimeDelta {
        TimeDelta::minutes(self.stuck_timeout_minutes.into())
    }
}

/// Retry bookkeeping shared by both queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: Option<u64>,
    /// Relative jitter, e.g. `0.1` for ±10%.
    pub jitter: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 5000,
            backoff_multiplier: 2.0,
            max_delay_ms: None,
            jitter: None,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
            backoff_multiplier,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(max_delay.as_millis() as u64);
        self
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter = Some(ratio);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if let Some(jitter) = self.jitter {
            if !(0.0..=1.0).contains(&jitter) {
                return Err(ConfigError::Invalid(format!(
                    "jitter must be between 0 and 1, got {jitter}"
                )));
            }
        }
        Ok(())
    }

    /// The backoff strategy described by this config.
    pub fn strategy(&self) -> BackoffStrategy<Exponential> {
        let base = TimeDelta::milliseconds(clamp_millis(self.base_delay_ms));
        let mut strategy = BackoffStrategy::exponential(base, self.backoff_multiplier);
        if let Some(max) = self.max_delay_ms {
            strategy = strategy.with_max(TimeDelta::milliseconds(clamp_millis(max)));
        }
        if let Some(ratio) = self.jitter {
            strategy = strategy.with_jitter(Jitter::Relative(ratio));
        }
        strategy
    }
}

fn clamp_millis(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}

/// Where stored log entries are mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogDestination {
    /// Keep entries in memory only.
    #[default]
    Memory,
    /// Additionally append every stored entry to a JSON-lines file.
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub destination: LogDestination,
    /// Re-emit stored entries as `tracing` events.
    pub console: bool,
    pub max_entries: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            destination: LogDestination::Memory,
            console: true,
            max_entries: 10_000,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_entries must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`crate::blog::BlogPostScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogSchedulerConfig {
    pub max_concurrent: usize,
    pub stuck_timeout_minutes: u32,
    pub retry: RetryConfig,
}

impl Default for BlogSchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            stuck_timeout_minutes: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl BlogSchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_owned(),
            ));
        }
        self.retry.validate()
    }

    pub fn stuck_timeout(&self) -> TimeDelta {
        TimeDelta::minutes(self.stuck_timeout_minutes.into())
    }
}
