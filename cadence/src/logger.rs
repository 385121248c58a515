//! Scheduler event log.
//!
//! [`SchedulerLogger`] keeps a bounded, leveled history of what the schedulers did so it can be
//! inspected at runtime (status pages, health checks) without access to the process output.
//! Every stored entry can additionally be re-emitted as a `tracing` event and appended to a
//! JSON-lines file, depending on [`LoggingConfig`].
use std::{
    collections::{BTreeMap, VecDeque},
    fmt::Display,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, RwLock},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

mod export;

pub use export::ExportFormat;

use crate::{
    clock::{self, Clock},
    config::{LogDestination, LoggingConfig},
    item::{ContentKind, ItemId, QueueItem},
    queue::RetryDecision,
};

const RECENT_ERRORS_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Failed to write log output")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode log entries")]
    Encode(#[from] serde_json::Error),
}

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_kind: Option<ContentKind>,
}

/// Tags attached to a log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    pub component: Option<String>,
    pub item_id: Option<ItemId>,
    pub item_kind: Option<ContentKind>,
}

impl LogContext {
    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            ..Default::default()
        }
    }

    pub fn with_item(self, id: ItemId, kind: ContentKind) -> Self {
        Self {
            item_id: Some(id),
            item_kind: Some(kind),
            ..self
        }
    }

    pub fn for_item(component: impl Into<String>, item: &QueueItem) -> Self {
        Self::component(component).with_item(item.id.clone(), item.kind)
    }
}

/// Selects entries from [`SchedulerLogger::entries_matching`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub min_level: Option<LogLevel>,
    pub component: Option<String>,
    pub item_id: Option<ItemId>,
    pub item_kind: Option<ContentKind>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the newest `limit` matches.
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_level(self, level: LogLevel) -> Self {
        Self {
            min_level: Some(level),
            ..self
        }
    }

    pub fn component(self, component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            ..self
        }
    }

    pub fn item(self, id: impl Into<ItemId>) -> Self {
        Self {
            item_id: Some(id.into()),
            ..self
        }
    }

    pub fn kind(self, kind: ContentKind) -> Self {
        Self {
            item_kind: Some(kind),
            ..self
        }
    }

    pub fn since(self, since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..self
        }
    }

    pub fn limit(self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self
        }
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        self.min_level.map_or(true, |level| entry.level >= level)
            && self
                .component
                .as_ref()
                .map_or(true, |component| entry.component.as_ref() == Some(component))
            && self
                .item_id
                .as_ref()
                .map_or(true, |id| entry.item_id.as_ref() == Some(id))
            && self
                .item_kind
                .map_or(true, |kind| entry.item_kind == Some(kind))
            && self.since.map_or(true, |since| entry.timestamp >= since)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogStats {
    pub total: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    pub by_component: BTreeMap<String, usize>,
    pub last_hour: usize,
    pub last_day: usize,
    /// Error entries from the last day, newest first.
    pub recent_errors: Vec<LogEntry>,
}

pub struct SchedulerLogger {
    entries: Mutex<VecDeque<LogEntry>>,
    config: RwLock<LoggingConfig>,
    /// Open handle for [`LogDestination::File`], reused across entries.
    sink: Mutex<Option<FileSink>>,
    clock: Arc<dyn Clock>,
}

struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    fn open(path: &Path) -> Result<Self, LoggerError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_owned(),
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, entry: &LogEntry) -> Result<(), LoggerError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        if entry.level >= LogLevel::Warn {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl Default for SchedulerLogger {
    fn default() -> Self {
        Self::new(LoggingConfig::default())
    }
}

impl std::fmt::Debug for SchedulerLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerLogger")
            .field("entries", &self.len())
            .field("config", &self.config())
            .finish()
    }
}

macro_rules! emit {
    ($macro:ident, $entry:expr) => {
        tracing::$macro!(
            component = $entry.component.as_deref().unwrap_or_default(),
            item_id = $entry.item_id.as_deref().unwrap_or_default(),
            item_kind = $entry.item_kind.map(|kind| kind.as_str()).unwrap_or_default(),
            data = ?$entry.data,
            "{}",
            $entry.message
        )
    };
}

impl SchedulerLogger {
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            config: RwLock::new(config),
            sink: Mutex::new(None),
            clock: clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> LoggingConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the logging config. Takes effect for the next entry; existing entries beyond a
    /// smaller `max_entries` are evicted straight away. An open log file is flushed and closed,
    /// and reopened by the next entry.
    pub fn update_config(&self, config: LoggingConfig) {
        let max_entries = config.max_entries.max(1);
        if let Some(mut old) = self.sink().take() {
            let _ = old
                .writer
                .flush()
                .inspect_err(|err| tracing::warn!(?err, "Failed to flush log file: {err}"));
        }
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        let mut entries = self.entries();
        while entries.len() > max_entries {
            entries.pop_front();
        }
    }

    /// Records an entry. Returns `false` if it was below the configured level.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
        context: LogContext,
    ) -> bool {
        let config = self.config();
        if level < config.level {
            return false;
        }
        let entry = LogEntry {
            timestamp: self.clock.now(),
            level,
            message: message.into(),
            data,
            component: context.component,
            item_id: context.item_id,
            item_kind: context.item_kind,
        };

        if config.console {
            match entry.level {
                LogLevel::Debug => emit!(debug, entry),
                LogLevel::Info => emit!(info, entry),
                LogLevel::Warn => emit!(warn, entry),
                LogLevel::Error => emit!(error, entry),
            }
        }
        if let LogDestination::File { path } = &config.destination {
            let _ = self.append_to_file(path, &entry).inspect_err(|err| {
                tracing::warn!(?err, path = %path.display(), "Failed to mirror log entry: {err}")
            });
        }

        let mut entries = self.entries();
        entries.push_back(entry);
        while entries.len() > config.max_entries.max(1) {
            entries.pop_front();
        }
        true
    }

    pub fn debug(&self, message: impl Into<String>, context: LogContext) -> bool {
        self.log(LogLevel::Debug, message, None, context)
    }

    pub fn info(&self, message: impl Into<String>, context: LogContext) -> bool {
        self.log(LogLevel::Info, message, None, context)
    }

    pub fn warn(&self, message: impl Into<String>, context: LogContext) -> bool {
        self.log(LogLevel::Warn, message, None, context)
    }

    pub fn error(&self, message: impl Into<String>, context: LogContext) -> bool {
        self.log(LogLevel::Error, message, None, context)
    }

    pub fn log_processing_start(&self, component: &str, item: &QueueItem) -> bool {
        self.log(
            LogLevel::Info,
            format!("Processing {} item {}", item.kind, item.id),
            Some(json!({
                "attempt": item.retry_count + 1,
                "max_retries": item.max_retries,
                "scheduled_at": item.scheduled_at,
            })),
            LogContext::for_item(component, item),
        )
    }

    pub fn log_processing_success(
        &self,
        component: &str,
        item: &QueueItem,
        elapsed: Duration,
    ) -> bool {
        self.log(
            LogLevel::Info,
            format!("Processing succeeded for {} item {}", item.kind, item.id),
            Some(json!({
                "duration_ms": elapsed.as_millis() as u64,
                "retry_count": item.retry_count,
            })),
            LogContext::for_item(component, item),
        )
    }

    pub fn log_processing_failure(
        &self,
        component: &str,
        item: &QueueItem,
        error: &str,
        decision: &RetryDecision,
    ) -> bool {
        let context = LogContext::for_item(component, item);
        match decision {
            RetryDecision::Retry {
                attempt,
                next_retry,
            } => self.log(
                LogLevel::Warn,
                format!(
                    "Processing failed for {} item {}, will retry (attempt {attempt} of {})",
                    item.kind, item.id, item.max_retries
                ),
                Some(json!({ "error": error, "next_retry": next_retry })),
                context,
            ),
            RetryDecision::Exhausted { attempts } => self.log(
                LogLevel::Error,
                format!(
                    "Processing failed for {} item {} after {attempts} attempts, giving up",
                    item.kind, item.id
                ),
                Some(json!({ "error": error })),
                context,
            ),
            RetryDecision::NotFound => self.log(
                LogLevel::Warn,
                format!(
                    "Processing failed for {} item {} which is no longer queued",
                    item.kind, item.id
                ),
                Some(json!({ "error": error })),
                context,
            ),
        }
    }

    pub fn log_queue_add(&self, component: &str, item: &QueueItem) -> bool {
        self.log(
            LogLevel::Debug,
            format!("Queued {} item {}", item.kind, item.id),
            Some(json!({ "priority": item.priority, "scheduled_at": item.scheduled_at })),
            LogContext::for_item(component, item),
        )
    }

    pub fn log_queue_remove(
        &self,
        component: &str,
        id: &ItemId,
        kind: ContentKind,
        reason: &str,
    ) -> bool {
        self.log(
            LogLevel::Debug,
            format!("Removed {kind} item {id} from the queue: {reason}"),
            None,
            LogContext::component(component).with_item(id.clone(), kind),
        )
    }

    pub fn log_scheduler_started(&self, component: &str, interval: Duration) -> bool {
        self.log(
            LogLevel::Info,
            "Scheduler started",
            Some(json!({ "interval_ms": interval.as_millis() as u64 })),
            LogContext::component(component),
        )
    }

    pub fn log_scheduler_stopped(&self, component: &str, forced: bool, active_jobs: usize) -> bool {
        let (level, message) = if forced {
            (LogLevel::Warn, "Scheduler stopped with jobs still active (forced)")
        } else {
            (LogLevel::Info, "Scheduler stopped")
        };
        self.log(
            level,
            message,
            Some(json!({ "forced": forced, "active_jobs": active_jobs })),
            LogContext::component(component),
        )
    }

    pub fn log_stuck_reset(&self, component: &str, count: usize) -> bool {
        self.log(
            LogLevel::Warn,
            format!("Reset {count} stuck items back to pending"),
            Some(json!({ "count": count })),
            LogContext::component(component),
        )
    }

    /// A snapshot of the stored entries matching `filter`, oldest first.
    pub fn entries_matching(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let entries = self.entries();
        let mut matching: Vec<_> = entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let skip = matching.len().saturating_sub(limit);
            matching.drain(..skip);
        }
        matching
    }

    /// Number of entries at `level` or above since `since`.
    pub fn count_since(&self, level: LogLevel, since: DateTime<Utc>) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.level >= level && entry.timestamp >= since)
            .count()
    }

    pub fn stats(&self) -> LogStats {
        let now = self.clock.now();
        let hour_ago = now - TimeDelta::hours(1);
        let day_ago = now - TimeDelta::days(1);
        let entries = self.entries();

        let mut stats = LogStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.iter() {
            *stats.by_level.entry(entry.level).or_default() += 1;
            if let Some(component) = &entry.component {
                *stats.by_component.entry(component.clone()).or_default() += 1;
            }
            if entry.timestamp >= hour_ago {
                stats.last_hour += 1;
            }
            if entry.timestamp >= day_ago {
                stats.last_day += 1;
            }
        }
        stats.recent_errors = entries
            .iter()
            .rev()
            .filter(|entry| entry.level == LogLevel::Error && entry.timestamp >= day_ago)
            .take(RECENT_ERRORS_LIMIT)
            .cloned()
            .collect();
        stats
    }

    /// Renders every stored entry in `format`.
    pub fn render(&self, format: ExportFormat) -> Result<String, LoggerError> {
        format.render(self.entries().iter())
    }

    /// Writes every stored entry to `path` in `format`, returning the number of entries written.
    pub fn export(&self, format: ExportFormat, path: impl AsRef<Path>) -> Result<usize, LoggerError> {
        let (count, rendered) = {
            let entries = self.entries();
            (entries.len(), format.render(entries.iter())?)
        };
        std::fs::write(path, rendered)?;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Writes buffered file output through to disk. Entries at Warn and above are flushed as
    /// they are logged.
    pub fn flush(&self) -> Result<(), LoggerError> {
        if let Some(sink) = self.sink().as_mut() {
            sink.writer.flush()?;
        }
        Ok(())
    }

    fn append_to_file(&self, path: &Path, entry: &LogEntry) -> Result<(), LoggerError> {
        let mut sink = self.sink();
        if sink.as_ref().map_or(true, |open| open.path != path) {
            *sink = Some(FileSink::open(path)?);
        }
        match sink.as_mut() {
            Some(sink) => sink.append(entry),
            None => Ok(()),
        }
    }

    fn sink(&self) -> MutexGuard<'_, Option<FileSink>> {
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeDelta;

    use super::*;
    use crate::clock::ManualClock;

    fn logger(level: LogLevel) -> (SchedulerLogger, ManualClock) {
        let clock = ManualClock::default();
        let logger = SchedulerLogger::new(LoggingConfig {
            level,
            console: false,
            ..Default::default()
        })
        .with_clock(Arc::new(clock.clone()));
        (logger, clock)
    }

    #[test]
    fn entries_below_level_are_dropped() {
        let (logger, _clock) = logger(LogLevel::Warn);

        assert!(!logger.debug("noise", LogContext::default()));
        assert!(!logger.info("still noise", LogContext::default()));
        assert!(logger.warn("careful", LogContext::default()));
        assert!(logger.error("broken", LogContext::default()));

        let levels: Vec<_> = logger
            .entries_matching(&LogFilter::new())
            .into_iter()
            .map(|entry| entry.level)
            .collect();
        assert_eq!(levels, vec![LogLevel::Warn, LogLevel::Error]);
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let (logger, _clock) = logger(LogLevel::Debug);
        logger.update_config(LoggingConfig {
            level: LogLevel::Debug,
            console: false,
            max_entries: 3,
            ..Default::default()
        });

        for i in 0..5 {
            logger.info(format!("entry {i}"), LogContext::default());
        }

        let messages: Vec<_> = logger
            .entries_matching(&LogFilter::new())
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn hot_reload_changes_level() {
        let (logger, _clock) = logger(LogLevel::Error);
        assert!(!logger.info("dropped", LogContext::default()));

        logger.update_config(LoggingConfig {
            level: LogLevel::Debug,
            console: false,
            ..Default::default()
        });

        assert!(logger.debug("kept", LogContext::default()));
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn filters_by_item_component_and_limit() {
        let (logger, clock) = logger(LogLevel::Debug);
        let now = clock.now();
        let item = QueueItem::raw_item("s1", ContentKind::Social, now);
        let other = QueueItem::raw_item("n1", ContentKind::Newsletter, now);

        logger.log_processing_start("scheduler", &item);
        logger.log_processing_start("scheduler", &other);
        logger.log_processing_success("scheduler", &item, Duration::from_millis(20));
        logger.info("cycle complete", LogContext::component("timer"));

        assert_eq!(logger.entries_matching(&LogFilter::new().item("s1")).len(), 2);
        assert_eq!(
            logger
                .entries_matching(&LogFilter::new().kind(ContentKind::Newsletter))
                .len(),
            1
        );
        assert_eq!(
            logger
                .entries_matching(&LogFilter::new().component("scheduler"))
                .len(),
            3
        );

        let newest = logger.entries_matching(&LogFilter::new().limit(1));
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].message, "cycle complete");
    }

    #[test]
    fn failure_messages_describe_retry_decision() {
        let (logger, clock) = logger(LogLevel::Debug);
        let item = QueueItem::raw_item("s1", ContentKind::Social, clock.now());

        logger.log_processing_failure(
            "scheduler",
            &item,
            "timeout",
            &RetryDecision::Retry {
                attempt: 1,
                next_retry: clock.now(),
            },
        );
        logger.log_processing_failure(
            "scheduler",
            &item,
            "timeout",
            &RetryDecision::Exhausted { attempts: 3 },
        );

        let entries = logger.entries_matching(&LogFilter::new());
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert!(entries[0].message.contains("will retry"));
        assert_eq!(entries[1].level, LogLevel::Error);
        assert!(entries[1].message.contains("giving up"));
        assert_eq!(entries[1].data, Some(json!({ "error": "timeout" })));
    }

    #[test]
    fn stats_aggregate_levels_components_and_windows() {
        let (logger, clock) = logger(LogLevel::Debug);
        logger.error("old failure", LogContext::component("blog-scheduler"));
        clock.advance(TimeDelta::hours(2));
        logger.info("started", LogContext::component("scheduler"));
        logger.error("publish failed", LogContext::component("scheduler"));
        logger.warn("untagged", LogContext::default());

        let stats = logger.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_level[&LogLevel::Error], 2);
        assert_eq!(stats.by_level[&LogLevel::Info], 1);
        assert_eq!(stats.by_component["scheduler"], 2);
        assert_eq!(stats.by_component["blog-scheduler"], 1);
        assert_eq!(stats.last_hour, 3);
        assert_eq!(stats.last_day, 4);
        assert_eq!(stats.recent_errors.len(), 2);
        assert_eq!(stats.recent_errors[0].message, "publish failed");

        clock.advance(TimeDelta::days(1) + TimeDelta::minutes(1));
        assert!(logger.stats().recent_errors.is_empty());
        assert_eq!(logger.count_since(LogLevel::Error, clock.now() - TimeDelta::hours(1)), 0);
    }

    #[test]
    fn file_destination_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.jsonl");
        let logger = SchedulerLogger::new(LoggingConfig {
            level: LogLevel::Info,
            console: false,
            destination: LogDestination::File { path: path.clone() },
            ..Default::default()
        });

        logger.info("first", LogContext::component("scheduler"));
        logger.warn("second", LogContext::default());

        // The warning flushes the buffered info line with it.
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<LogEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "first");
        assert_eq!(lines[0].component.as_deref(), Some("scheduler"));
        assert_eq!(lines[1].level, LogLevel::Warn);
    }

    #[test]
    fn file_destination_keeps_one_handle_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.jsonl");
        let moved = dir.path().join("rotated.jsonl");
        let logger = SchedulerLogger::new(LoggingConfig {
            level: LogLevel::Info,
            console: false,
            destination: LogDestination::File { path: path.clone() },
            ..Default::default()
        });

        logger.info("first", LogContext::default());
        std::fs::rename(&path, &moved).unwrap();
        logger.info("second", LogContext::default());
        logger.flush().unwrap();

        assert!(!path.exists());
        assert_eq!(std::fs::read_to_string(&moved).unwrap().lines().count(), 2);

        logger.update_config(LoggingConfig {
            level: LogLevel::Info,
            console: false,
            destination: LogDestination::File { path: path.clone() },
            max_entries: 5,
        });
        logger.info("third", LogContext::default());
        logger.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&moved).unwrap().lines().count(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn forced_stop_is_a_warning() {
        let (logger, _clock) = logger(LogLevel::Debug);

        logger.log_scheduler_started("scheduler", Duration::from_secs(60));
        logger.log_scheduler_stopped("scheduler", true, 1);

        let entries = logger.entries_matching(&LogFilter::new().component("scheduler"));
        assert_eq!(entries[0].data, Some(json!({ "interval_ms": 60000 })));
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert!(entries[1].message.contains("forced"));
    }

    #[test]
    fn clear_empties_the_buffer() {
        let (logger, _clock) = logger(LogLevel::Debug);
        logger.info("one", LogContext::default());

        logger.clear();

        assert!(logger.is_empty());
    }
}
