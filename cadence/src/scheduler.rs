//! The content scheduler.
//!
//! [`ContentScheduler`] ties a [`SchedulerQueue`] to one [`Channel`] per [`ContentKind`]. Every
//! processing cycle it:
//!
//! 1. loads ready content from each channel's source, concurrently. A failing source is
//!    reported and does not stop the others from loading.
//! 2. queues every item that is not already queued.
//! 3. resets items that have been processing for longer than the stuck timeout. A reset item no
//!    longer counts as active, and whatever its old job reports later is ignored.
//! 4. claims ready items in priority order while fewer than `max_concurrent_jobs` are active and
//!    publishes each in its own task without waiting for it.
//! 5. starts a blog pass in its own task when a [`BlogPostScheduler`] is composed in.
//!
//! Failed publishes go back to the queue with exponential backoff until their retries are used
//! up, at which point the source is told the item failed.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! use std::time::Duration;
//! use cadence::prelude::*;
//! use cadence::testing::ScriptedPublisher;
//! use chrono::{TimeDelta, Utc};
//! use serde_json::json;
//!
//! let social = InMemorySource::new();
//! social
//!     .insert(ScheduledContent::new("s1", Utc::now() - TimeDelta::minutes(5), json!({ "text": "hi" })))
//!     .unwrap();
//!
//! let scheduler = ContentScheduler::builder(SchedulerConfig::default())
//!     .with_channel(ContentKind::Social, social.clone(), ScriptedPublisher::new())
//!     .build()
//!     .unwrap();
//!
//! let report = scheduler.process_cycle().await;
//! assert_eq!(report.dispatched, vec![ItemId::from("s1")]);
//!
//! assert!(scheduler.wait_idle(Duration::from_secs(1)).await);
//! assert_eq!(social.status(&"s1".into()), Some(ContentStatus::Published));
//! # });
//! ```
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, RwLock,
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use fxhash::FxHashMap;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

mod dispatch;
mod runner;

use dispatch::Job;

use crate::{
    blog::{BlogPostScheduler, BlogProcessReport, BlogSchedulingStats},
    clock::{self, Clock},
    config::{ConfigError, SchedulerConfig},
    item::{ContentKind, ItemId, QueueItem, ScheduledContent},
    logger::{LogContext, LogEntry, LogFilter, LogLevel, LogStats, SchedulerLogger},
    queue::{QueueStats, SchedulerQueue},
    source::{ContentSource, Publisher},
};

pub(crate) const COMPONENT: &str = "scheduler";

/// The source and publisher for one kind of content.
#[derive(Clone)]
pub struct Channel {
    pub source: Arc<dyn ContentSource>,
    pub publisher: Arc<dyn Publisher>,
}

/// The outcome of a health check. `healthy` is true when there are no issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport<S> {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub status: S,
}

impl<S> HealthReport<S> {
    pub fn new(issues: Vec<String>, status: S) -> Self {
        Self {
            healthy: issues.is_empty(),
            issues,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadError {
    pub kind: ContentKind,
    pub error: String,
}

/// What one processing cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub loaded: usize,
    pub enqueued: usize,
    pub stuck_reset: usize,
    /// Items handed to a publisher this cycle, in the order they were claimed.
    pub dispatched: Vec<ItemId>,
    pub load_errors: Vec<LoadError>,
    /// A blog pass was started. Its report ends up in [`SchedulerStatus::last_blog_pass`].
    pub blog_pass_started: bool,
}

/// Running totals since the scheduler was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerCounters {
    pub cycles: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub failed: u64,
    pub stuck_resets: u64,
    pub load_errors: u64,
}

impl SchedulerCounters {
    /// The change from `before` to `self`.
    pub fn since(&self, before: &Self) -> Self {
        Self {
            cycles: self.cycles.saturating_sub(before.cycles),
            dispatched: self.dispatched.saturating_sub(before.dispatched),
            succeeded: self.succeeded.saturating_sub(before.succeeded),
            retried: self.retried.saturating_sub(before.retried),
            failed: self.failed.saturating_sub(before.failed),
            stuck_resets: self.stuck_resets.saturating_sub(before.stuck_resets),
            load_errors: self.load_errors.saturating_sub(before.load_errors),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForceProcessReport {
    pub cycle: CycleReport,
    pub before: SchedulerCounters,
    pub after: SchedulerCounters,
    pub delta: SchedulerCounters,
    /// Jobs were still active when the force process timeout elapsed.
    pub timed_out: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// The stop timeout elapsed before the active jobs and blog passes drained.
    pub forced: bool,
    pub active_jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub active_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub processing_interval_ms: u64,
    pub channels: Vec<ContentKind>,
    pub queue: QueueStats,
    pub counters: SchedulerCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog: Option<BlogSchedulingStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_blog_pass: Option<BlogProcessReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueDetails {
    /// Live items in processing order.
    pub items: Vec<QueueItem>,
    pub active: Vec<ItemId>,
    pub stuck: Vec<ItemId>,
    pub history: Vec<QueueItem>,
    pub blog: Vec<QueueItem>,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    stuck_resets: AtomicU64,
    load_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SchedulerCounters {
        SchedulerCounters {
            cycles: self.cycles.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stuck_resets: self.stuck_resets.load(Ordering::Relaxed),
            load_errors: self.load_errors.load(Ordering::Relaxed),
        }
    }

    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Lifecycle {
    timer: Option<CancellationToken>,
    started_at: Option<DateTime<Utc>>,
}

struct Inner {
    config: RwLock<SchedulerConfig>,
    channels: FxHashMap<ContentKind, Channel>,
    queue: Mutex<SchedulerQueue>,
    /// Item being published to the slot of the job that owns it.
    active_jobs: Mutex<FxHashMap<ItemId, u64>>,
    next_slot: AtomicU64,
    blog: Option<Arc<BlogPostScheduler>>,
    blog_passes: AtomicUsize,
    last_blog_pass: Mutex<Option<BlogProcessReport>>,
    logger: Arc<SchedulerLogger>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    last_cycle_at: Mutex<Option<DateTime<Utc>>>,
    counters: Counters,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, SchedulerQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn active_jobs(&self) -> MutexGuard<'_, FxHashMap<ItemId, u64>> {
        self.active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn last_blog_pass(&self) -> MutexGuard<'_, Option<BlogProcessReport>> {
        self.last_blog_pass
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ContentSchedulerBuilder {
    config: SchedulerConfig,
    channels: FxHashMap<ContentKind, Channel>,
    blog: Option<BlogPostScheduler>,
    clock: Option<Arc<dyn Clock>>,
    logger: Option<Arc<SchedulerLogger>>,
}

impl ContentSchedulerBuilder {
    /// Registers the source and publisher for `kind`, replacing any earlier registration.
    pub fn with_channel<S, P>(mut self, kind: ContentKind, source: S, publisher: P) -> Self
    where
        S: ContentSource + 'static,
        P: Publisher + 'static,
    {
        self.channels.insert(
            kind,
            Channel {
                source: Arc::new(source),
                publisher: Arc::new(publisher),
            },
        );
        self
    }

    /// Composes a blog scheduler in. It is switched over to the scheduler's clock and logger.
    pub fn with_blog_scheduler(mut self, blog: BlogPostScheduler) -> Self {
        self.blog = Some(blog);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses `logger` as is. Without one, a logger is built from the config's `logging` section.
    pub fn with_logger(mut self, logger: Arc<SchedulerLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<ContentScheduler, ConfigError> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(clock::system);
        let logger = self.logger.unwrap_or_else(|| {
            Arc::new(SchedulerLogger::new(self.config.logging.clone()).with_clock(clock.clone()))
        });
        let queue = SchedulerQueue::new(self.config.retry.strategy(), self.config.history_capacity)
            .with_clock(clock.clone());
        let blog = self
            .blog
            .map(|blog| Arc::new(blog.with_clock(clock.clone()).with_logger(logger.clone())));

        Ok(ContentScheduler {
            inner: Arc::new(Inner {
                config: RwLock::new(self.config),
                channels: self.channels,
                queue: Mutex::new(queue),
                active_jobs: Default::default(),
                next_slot: AtomicU64::new(0),
                blog,
                blog_passes: AtomicUsize::new(0),
                last_blog_pass: Default::default(),
                logger,
                clock,
                running: AtomicBool::new(false),
                lifecycle: Default::default(),
                last_cycle_at: Default::default(),
                counters: Default::default(),
            }),
        })
    }
}

/// Handle to a content scheduler. Clones share the same scheduler.
#[derive(Clone)]
pub struct ContentScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ContentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentScheduler")
            .field("running", &self.is_running())
            .field("channels", &self.channel_kinds())
            .field("active_jobs", &self.active_job_count())
            .finish_non_exhaustive()
    }
}

impl ContentScheduler {
    pub fn builder(config: SchedulerConfig) -> ContentSchedulerBuilder {
        ContentSchedulerBuilder {
            config,
            channels: Default::default(),
            blog: None,
            clock: None,
            logger: None,
        }
    }

    pub fn logger(&self) -> &Arc<SchedulerLogger> {
        &self.inner.logger
    }

    pub fn blog_scheduler(&self) -> Option<&Arc<BlogPostScheduler>> {
        self.inner.blog.as_ref()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> SchedulerCounters {
        self.inner.counters.snapshot()
    }

    /// Starts the timer. The first cycle runs straight away.
    ///
    /// Returns `false`, and logs a warning, if the scheduler was already running. Must be called
    /// from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.timer.is_some() {
            drop(lifecycle);
            tracing::warn!("Scheduler is already running");
            self.inner
                .logger
                .warn("Scheduler is already running", LogContext::component(COMPONENT));
            return false;
        }

        let interval = self.config().processing_interval();
        let token = CancellationToken::new();
        runner::spawn(self.clone(), tokio::time::Instant::now(), interval, token.clone());
        lifecycle.timer = Some(token);
        lifecycle.started_at = Some(self.inner.clock.now());
        self.inner.running.store(true, Ordering::SeqCst);
        drop(lifecycle);

        tracing::info!(interval_ms = interval.as_millis() as u64, "Scheduler started");
        self.inner.logger.log_scheduler_started(COMPONENT, interval);
        true
    }

    /// Stops the timer and waits up to `stop_timeout_ms` for active jobs to finish.
    ///
    /// In-flight publishes are never interrupted. If they outlast the timeout the scheduler is
    /// stopped anyway and the report is marked as forced.
    pub async fn stop(&self) -> StopReport {
        let timer = self.inner.lifecycle().timer.take();
        let Some(timer) = timer else {
            tracing::warn!("Scheduler is not running");
            self.inner
                .logger
                .warn("Scheduler is not running", LogContext::component(COMPONENT));
            return StopReport {
                forced: false,
                active_jobs: self.active_job_count(),
            };
        };
        timer.cancel();

        let drained = self.wait_idle(self.config().stop_timeout()).await;
        let active_jobs = self.active_job_count();
        {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.timer.is_none() {
                lifecycle.started_at = None;
                self.inner.running.store(false, Ordering::SeqCst);
            }
        }

        let forced = !drained;
        if forced {
            tracing::warn!(active_jobs, "Scheduler stopped with {active_jobs} jobs still active");
        } else {
            tracing::info!("Scheduler stopped");
        }
        self.inner
            .logger
            .log_scheduler_stopped(COMPONENT, forced, active_jobs);
        StopReport {
            forced,
            active_jobs,
        }
    }

    /// Runs one cycle outside the timer and waits for its jobs and blog pass, all within
    /// `force_process_timeout_ms`.
    ///
    /// On timeout the cycle and its jobs carry on in the background.
    pub async fn force_process(&self) -> ForceProcessReport {
        let timeout = self.config().force_process_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        let started = std::time::Instant::now();
        let before = self.counters();
        self.inner
            .logger
            .info("Force processing triggered", LogContext::component(COMPONENT));

        let cycle = tokio::spawn({
            let scheduler = self.clone();
            async move { scheduler.process_cycle().await }
        });
        let (cycle, timed_out) = match tokio::time::timeout_at(deadline, cycle).await {
            Ok(result) => {
                let cycle = result
                    .inspect_err(|err| {
                        tracing::error!(?err, "Forced processing cycle failed: {err}");
                        self.inner.logger.error(
                            format!("Forced processing cycle failed: {err}"),
                            LogContext::component(COMPONENT),
                        );
                    })
                    .unwrap_or_default();
                (cycle, !self.wait_until_idle(deadline).await)
            }
            Err(_) => (CycleReport::default(), true),
        };
        let after = self.counters();
        let report = ForceProcessReport {
            delta: after.since(&before),
            cycle,
            before,
            after,
            timed_out,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        self.inner.logger.log(
            if timed_out {
                LogLevel::Warn
            } else {
                LogLevel::Info
            },
            if timed_out {
                "Force processing timed out with jobs still active"
            } else {
                "Force processing complete"
            },
            serde_json::to_value(report.delta).ok(),
            LogContext::component(COMPONENT),
        );
        report
    }

    /// Runs one load, enqueue, self-heal and dispatch cycle.
    ///
    /// Dispatched jobs and the blog pass keep running after this returns. See
    /// [`ContentScheduler::wait_idle`].
    pub async fn process_cycle(&self) -> CycleReport {
        let inner = &self.inner;
        let config = self.config();
        let mut report = CycleReport::default();
        inner.counters.cycles.fetch_add(1, Ordering::Relaxed);
        *inner
            .last_cycle_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(inner.clock.now());

        let loads = futures::future::join_all(inner.channels.iter().map(
            |(kind, channel)| async move { (*kind, channel.source.ready_items().await) },
        ))
        .await;

        for (kind, result) in loads {
            match result {
                Ok(contents) => {
                    report.loaded += contents.len();
                    report.enqueued += self.enqueue_all(kind, contents, config.retry.max_retries);
                }
                Err(err) => {
                    tracing::error!(?err, %kind, "Failed to load ready {kind} content: {err}");
                    inner.logger.log(
                        LogLevel::Error,
                        format!("Failed to load ready {kind} content"),
                        Some(json!({ "error": err.to_string() })),
                        LogContext {
                            component: Some(COMPONENT.to_owned()),
                            item_kind: Some(kind),
                            ..Default::default()
                        },
                    );
                    inner.counters.load_errors.fetch_add(1, Ordering::Relaxed);
                    report.load_errors.push(LoadError {
                        kind,
                        error: err.to_string(),
                    });
                }
            }
        }

        report.stuck_reset = {
            let mut active = inner.active_jobs();
            let reset = inner.queue().reset_stuck_items(config.stuck_timeout());
            for id in &reset {
                active.remove(id);
            }
            reset.len()
        };
        if report.stuck_reset > 0 {
            inner
                .counters
                .stuck_resets
                .fetch_add(report.stuck_reset as u64, Ordering::Relaxed);
            inner.logger.log_stuck_reset(COMPONENT, report.stuck_reset);
        }

        report.dispatched = self.dispatch_ready(config.max_concurrent_jobs);

        if let Some(blog) = &inner.blog {
            self.spawn_blog_pass(blog.clone());
            report.blog_pass_started = true;
        }

        inner.logger.log(
            LogLevel::Debug,
            "Processing cycle complete",
            Some(json!({
                "loaded": report.loaded,
                "enqueued": report.enqueued,
                "stuck_reset": report.stuck_reset,
                "dispatched": report.dispatched.len(),
                "load_errors": report.load_errors.len(),
            })),
            LogContext::component(COMPONENT),
        );
        report
    }

    /// Waits up to `timeout` for every active job and blog pass to finish. Returns `false` on
    /// timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.wait_until_idle(tokio::time::Instant::now() + timeout)
            .await
    }

    async fn wait_until_idle(&self, deadline: tokio::time::Instant) -> bool {
        let poll = self.config().drain_poll_interval();
        loop {
            if self.active_job_count() == 0 && self.inner.blog_passes.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Queues `content` directly. Returns `false` if an item with the same id is already queued.
    pub fn schedule(&self, kind: ContentKind, content: ScheduledContent) -> bool {
        let max_retries = self.config().retry.max_retries;
        self.enqueue_all(kind, [content], max_retries) == 1
    }

    /// Drops an item from the queue. An in-flight publish of it is not interrupted.
    pub fn unschedule(&self, id: &ItemId) -> Option<QueueItem> {
        let removed = self.inner.queue().remove(id);
        if let Some(item) = &removed {
            self.inner
                .logger
                .log_queue_remove(COMPONENT, id, item.kind, "unscheduled");
        }
        removed
    }

    /// Applies `update` to a copy of the config and swaps it in if it is valid.
    ///
    /// The queue picks up the new backoff and history capacity, the logger the new logging
    /// config, and a running timer is restarted when the interval changed.
    pub fn update_config(
        &self,
        update: impl FnOnce(&mut SchedulerConfig),
    ) -> Result<(), ConfigError> {
        let mut config = self.config();
        update(&mut config);
        config.validate()?;

        {
            let mut queue = self.inner.queue();
            queue.set_backoff(config.retry.strategy());
            queue.set_history_capacity(config.history_capacity);
        }
        self.inner.logger.update_config(config.logging.clone());
        let interval = config.processing_interval();
        let previous = std::mem::replace(
            &mut *self
                .inner
                .config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            config,
        );

        if previous.processing_interval() != interval {
            let mut lifecycle = self.inner.lifecycle();
            if let Some(timer) = lifecycle.timer.take() {
                timer.cancel();
                let token = CancellationToken::new();
                runner::spawn(
                    self.clone(),
                    tokio::time::Instant::now() + interval,
                    interval,
                    token.clone(),
                );
                lifecycle.timer = Some(token);
                tracing::debug!(interval_ms = interval.as_millis() as u64, "Restarted scheduler timer");
            }
        }

        self.inner
            .logger
            .info("Scheduler config updated", LogContext::component(COMPONENT));
        Ok(())
    }

    pub async fn health_check(&self) -> HealthReport<SchedulerStatus> {
        let config = self.config();
        let mut issues = Vec::new();

        if !self.is_running() {
            issues.push("Scheduler is not running".to_owned());
        }

        let stuck = self.inner.queue().stuck_items(config.stuck_timeout()).len();
        if stuck > 0 {
            issues.push(format!(
                "{stuck} items stuck in processing for more than {} minutes",
                config.stuck_timeout_minutes
            ));
        }

        let hour_ago = self.inner.clock.now() - TimeDelta::hours(1);
        let errors = self.inner.logger.count_since(LogLevel::Error, hour_ago);
        if errors > config.max_recent_errors {
            issues.push(format!("High error rate: {errors} errors in the last hour"));
        }

        let probes = futures::future::join_all(self.inner.channels.iter().map(|(kind, channel)| {
            let source = channel.source.clone();
            let kind = *kind;
            async move { (kind, tokio::spawn(async move { source.probe().await }).await) }
        }))
        .await;
        for (kind, probe) in probes {
            match probe {
                Ok(Ok(())) => {}
                Ok(Err(err)) => issues.push(format!("{kind} source unreachable: {err}")),
                Err(err) => issues.push(format!("{kind} source probe failed: {err}")),
            }
        }

        if let Some(blog) = &self.inner.blog {
            issues.extend(blog.health_check().await.issues);
        }

        HealthReport::new(issues, self.status())
    }

    pub fn status(&self) -> SchedulerStatus {
        let config = self.config();
        let started_at = self.inner.lifecycle().started_at;
        let last_cycle_at = *self
            .inner
            .last_cycle_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let queue = self.inner.queue().stats();
        SchedulerStatus {
            running: self.is_running(),
            started_at,
            last_cycle_at,
            active_jobs: self.active_job_count(),
            max_concurrent_jobs: config.max_concurrent_jobs,
            processing_interval_ms: config.processing_interval_ms,
            channels: self.channel_kinds(),
            queue,
            counters: self.counters(),
            blog: self
                .inner
                .blog
                .as_ref()
                .map(|blog| blog.blog_scheduling_stats()),
            last_blog_pass: self.inner.last_blog_pass().clone(),
        }
    }

    pub fn queue_details(&self) -> QueueDetails {
        let stuck_timeout = self.config().stuck_timeout();
        let (items, stuck, history) = {
            let queue = self.inner.queue();
            let stuck = queue
                .stuck_items(stuck_timeout)
                .into_iter()
                .map(|item| item.id)
                .collect();
            (queue.items(), stuck, queue.history())
        };
        let mut active: Vec<_> = self.inner.active_jobs().keys().cloned().collect();
        active.sort();
        QueueDetails {
            items,
            active,
            stuck,
            history,
            blog: self
                .inner
                .blog
                .as_ref()
                .map(|blog| blog.queued_posts())
                .unwrap_or_default(),
        }
    }

    pub fn logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.inner.logger.entries_matching(filter)
    }

    pub fn log_stats(&self) -> LogStats {
        self.inner.logger.stats()
    }

    fn active_job_count(&self) -> usize {
        self.inner.active_jobs().len()
    }

    fn channel_kinds(&self) -> Vec<ContentKind> {
        let mut kinds: Vec<_> = self.inner.channels.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn enqueue_all(
        &self,
        kind: ContentKind,
        contents: impl IntoIterator<Item = ScheduledContent>,
        max_retries: u32,
    ) -> usize {
        let now = self.inner.clock.now();
        let mut queue = self.inner.queue();
        let mut added = 0;
        for content in contents {
            if queue.contains(&content.id) {
                continue;
            }
            let item = QueueItem::new(kind, content, max_retries, now);
            self.inner.logger.log_queue_add(COMPONENT, &item);
            if queue.add(item) {
                added += 1;
            }
        }
        added
    }

    /// Claims ready items until the concurrency cap is reached and spawns a job for each.
    fn dispatch_ready(&self, max_concurrent_jobs: usize) -> Vec<ItemId> {
        let mut dispatched = Vec::new();
        while let Some(job) = self.claim_next(max_concurrent_jobs) {
            dispatched.push(job.item.id.clone());
            self.inner.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(self.clone().run_job(job));
        }
        dispatched
    }

    fn claim_next(&self, max_concurrent_jobs: usize) -> Option<Job> {
        let mut active = self.inner.active_jobs();
        if active.len() >= max_concurrent_jobs {
            return None;
        }
        let mut queue = self.inner.queue();
        let next = queue.get_next()?;
        if !queue.mark_processing(&next.id) {
            tracing::warn!(id = %next.id, "Could not mark item {} as processing", next.id);
            return None;
        }
        let item = queue.get(&next.id).cloned().unwrap_or(next);
        let slot = self.inner.next_slot.fetch_add(1, Ordering::Relaxed);
        active.insert(item.id.clone(), slot);
        Some(Job { slot, item })
    }
}
