//! Scheduling for blog posts.
//!
//! [`BlogPostScheduler`] follows the same load, enqueue, self-heal and dispatch cycle as
//! [`crate::scheduler::ContentScheduler`] but keeps its own queue and retry config, records
//! schedules in a [`BlogStore`], and fires an [`AutomationTrigger`] after each successful
//! publish. Automation failures are logged and never affect the publish.
//!
//! When composed into a `ContentScheduler`, every processing cycle also starts a blog pass in the
//! background.
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, RwLock,
    },
    time::Instant,
};

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use fxhash::FxHashMap;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{
    backoff::{BackoffStrategy, Exponential, Strategy},
    clock::{self, Clock},
    config::{BlogSchedulerConfig, ConfigError},
    item::{priority_for, ContentKind, ItemId, ItemStatus, QueueItem, ScheduledContent},
    logger::{LogContext, LogLevel, SchedulerLogger},
    queue::RetryDecision,
    scheduler::HealthReport,
    source::{AutomationTrigger, BlogStore, PublishOutcome, Publisher, SourceError},
};

const COMPONENT: &str = "blog-scheduler";

#[derive(Debug, Error)]
pub enum BlogSchedulerError {
    #[error("Blog store error: {0}")]
    Store(#[from] SourceError),
    #[error("Blog post {0} is not scheduled")]
    NotScheduled(ItemId),
}

/// The result of one blog processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlogProcessReport {
    pub loaded: usize,
    pub enqueued: usize,
    pub stuck_reset: usize,
    pub processed: usize,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
    pub automation_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl BlogProcessReport {
    fn record(&mut self, outcome: PostOutcome) {
        self.processed += 1;
        match outcome {
            PostOutcome::Published { automation_failed } => {
                self.published += 1;
                if automation_failed {
                    self.automation_failures += 1;
                }
            }
            PostOutcome::Retrying => self.retried += 1,
            PostOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlogSchedulingStats {
    pub queued: usize,
    pub pending: usize,
    pub processing: usize,
    /// Pending entries that are due now.
    pub ready: usize,
    /// Entries that have failed at least once and are waiting for another attempt.
    pub retrying: usize,
    pub next_due: Option<DateTime<Utc>>,
    pub total_published: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub automation_failures: u64,
}

enum PostOutcome {
    Published { automation_failed: bool },
    Retrying,
    Failed,
}

#[derive(Default)]
struct BlogQueue {
    entries: FxHashMap<ItemId, QueueItem>,
    next_sequence: u64,
}

impl BlogQueue {
    /// Adds a new entry, or moves an already pending entry to the new schedule.
    fn upsert(&mut self, post: ScheduledContent, max_retries: u32, now: DateTime<Utc>) -> bool {
        if let Some(entry) = self.entries.get_mut(&post.id) {
            if entry.status == ItemStatus::Pending {
                entry.priority = priority_for(post.scheduled_at, now);
                entry.next_retry = post.scheduled_at.max(now);
                entry.scheduled_at = post.scheduled_at;
                entry.data = post.data;
            }
            return false;
        }
        self.insert(QueueItem::new(ContentKind::Blog, post, max_retries, now))
    }

    fn insert(&mut self, mut item: QueueItem) -> bool {
        if self.entries.contains_key(&item.id) {
            return false;
        }
        item.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(item.id.clone(), item);
        true
    }

    /// Ids of the entries that are due, in priority order.
    fn ready_ids(&self, now: DateTime<Utc>) -> Vec<ItemId> {
        let mut ready: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.is_ready(now))
            .collect();
        ready.sort_by_key(|entry| entry.ordering_key());
        ready.into_iter().map(|entry| entry.id.clone()).collect()
    }

    /// Marks one entry as processing if it is still ready and fewer than `max_in_flight`
    /// entries are processing.
    fn claim(&mut self, id: &ItemId, now: DateTime<Utc>, max_in_flight: usize) -> Option<QueueItem> {
        let in_flight = self
            .entries
            .values()
            .filter(|entry| entry.status == ItemStatus::Processing)
            .count();
        if in_flight >= max_in_flight {
            return None;
        }
        let entry = self.entries.get_mut(id).filter(|entry| entry.is_ready(now))?;
        entry.status = ItemStatus::Processing;
        entry.last_attempt = Some(now);
        Some(entry.clone())
    }

    /// Whether `claimed` still owns its entry. A stuck reset or a reschedule takes it away.
    fn owns(&self, claimed: &QueueItem) -> bool {
        self.entries.get(&claimed.id).is_some_and(|entry| {
            entry.status == ItemStatus::Processing && entry.last_attempt == claimed.last_attempt
        })
    }

    fn fail(
        &mut self,
        id: &ItemId,
        error: &str,
        backoff: &BackoffStrategy<Exponential>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        let Some(entry) = self.entries.get_mut(id) else {
            return RetryDecision::NotFound;
        };
        entry.retry_count = entry.retry_count.saturating_add(1);
        entry.last_error = Some(error.to_owned());
        if entry.retry_count >= entry.max_retries {
            let attempts = entry.retry_count;
            self.entries.remove(id);
            RetryDecision::Exhausted { attempts }
        } else {
            let delay = backoff.backoff(entry.retry_count).max(TimeDelta::zero());
            entry.next_retry = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
            entry.status = ItemStatus::Pending;
            RetryDecision::Retry {
                attempt: entry.retry_count,
                next_retry: entry.next_retry,
            }
        }
    }

    fn reset_stuck(&mut self, timeout: TimeDelta, now: DateTime<Utc>) -> usize {
        let mut count = 0;
        for entry in self.entries.values_mut() {
            if entry.is_stuck(now, timeout) {
                entry.status = ItemStatus::Pending;
                entry.next_retry = now;
                count += 1;
            }
        }
        count
    }

    fn make_all_due(&mut self, now: DateTime<Utc>) -> usize {
        let mut count = 0;
        for entry in self.entries.values_mut() {
            if entry.status == ItemStatus::Pending && entry.next_retry > now {
                entry.next_retry = now;
                count += 1;
            }
        }
        count
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    automation_failures: AtomicU64,
}

pub struct BlogPostScheduler {
    config: RwLock<BlogSchedulerConfig>,
    store: Arc<dyn BlogStore>,
    publisher: Arc<dyn Publisher>,
    automation: Option<Arc<dyn AutomationTrigger>>,
    queue: Mutex<BlogQueue>,
    counters: Counters,
    logger: Arc<SchedulerLogger>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BlogPostScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlogPostScheduler")
            .field("config", &self.config())
            .field("queued", &self.queue().entries.len())
            .finish_non_exhaustive()
    }
}

impl BlogPostScheduler {
    pub fn new<S, P>(config: BlogSchedulerConfig, store: S, publisher: P) -> Self
    where
        S: BlogStore + 'static,
        P: Publisher + 'static,
    {
        Self {
            config: RwLock::new(config),
            store: Arc::new(store),
            publisher: Arc::new(publisher),
            automation: None,
            queue: Default::default(),
            counters: Default::default(),
            logger: Default::default(),
            clock: clock::system(),
        }
    }

    pub fn with_automation(mut self, automation: impl AutomationTrigger + 'static) -> Self {
        self.automation = Some(Arc::new(automation));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Arc<SchedulerLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &Arc<SchedulerLogger> {
        &self.logger
    }

    pub fn config(&self) -> BlogSchedulerConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the config. Entries already queued keep their `max_retries`.
    pub fn update_config(&self, config: BlogSchedulerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        self.logger.info("Blog scheduler config updated", LogContext::component(COMPONENT));
        Ok(())
    }

    /// Records the schedule in the store and queues the post.
    ///
    /// Scheduling a post that is already queued and not in flight moves it to the new time.
    pub async fn schedule_blog_post(&self, post: ScheduledContent) -> Result<(), BlogSchedulerError> {
        let id = post.id.clone();
        let scheduled_at = post.scheduled_at;
        self.store
            .schedule(&id, scheduled_at)
            .await
            .inspect_err(|err| {
                tracing::error!(?err, %id, "Failed to schedule blog post {id}: {err}");
            })?;

        let now = self.clock.now();
        let max_retries = self.config().retry.max_retries;
        let added = self.queue().upsert(post, max_retries, now);
        self.logger.log(
            LogLevel::Info,
            if added {
                format!("Scheduled blog post {id}")
            } else {
                format!("Rescheduled blog post {id}")
            },
            Some(json!({ "scheduled_at": scheduled_at })),
            LogContext::component(COMPONENT).with_item(id, ContentKind::Blog),
        );
        Ok(())
    }

    /// Clears the schedule in the store and drops the post from the queue.
    ///
    /// Returns whether the post was queued.
    pub async fn unschedule_blog_post(&self, id: &ItemId) -> Result<bool, BlogSchedulerError> {
        self.store.unschedule(id).await.map_err(|err| match err {
            SourceError::NotFound(id) => BlogSchedulerError::NotScheduled(id),
            err => BlogSchedulerError::Store(err),
        })?;
        let removed = self.queue().entries.remove(id).is_some();
        if removed {
            self.logger
                .log_queue_remove(COMPONENT, id, ContentKind::Blog, "unscheduled");
        }
        Ok(removed)
    }

    /// Runs one pass: load due posts, queue new ones, reset stuck entries and publish every
    /// ready entry with at most `max_concurrent` publishes in flight.
    ///
    /// Passes may overlap. An entry is claimed only when its publish starts, and the cap counts
    /// the processing entries of every pass.
    pub async fn process_scheduled_blog_posts(&self) -> BlogProcessReport {
        let config = self.config();
        let mut report = BlogProcessReport::default();

        match self.store.ready_items().await {
            Ok(posts) => {
                report.loaded = posts.len();
                let now = self.clock.now();
                let mut queue = self.queue();
                for post in posts {
                    let item = QueueItem::new(ContentKind::Blog, post, config.retry.max_retries, now);
                    if queue.insert(item.clone()) {
                        report.enqueued += 1;
                        self.logger.log_queue_add(COMPONENT, &item);
                    }
                }
            }
            Err(err) => {
                tracing::error!(?err, "Failed to load scheduled blog posts: {err}");
                self.logger.log(
                    LogLevel::Error,
                    "Failed to load scheduled blog posts",
                    Some(json!({ "error": err.to_string() })),
                    LogContext::component(COMPONENT),
                );
                report.load_error = Some(err.to_string());
            }
        }

        let now = self.clock.now();
        report.stuck_reset = self.queue().reset_stuck(config.stuck_timeout(), now);
        if report.stuck_reset > 0 {
            self.logger.log_stuck_reset(COMPONENT, report.stuck_reset);
        }

        let ready = self.queue().ready_ids(now);
        let backoff = config.retry.strategy();
        let max_in_flight = config.max_concurrent.max(1);
        let outcomes: Vec<_> = futures::stream::iter(ready)
            .map(|id| self.publish_post(id, max_in_flight, &backoff))
            .buffer_unordered(max_in_flight)
            .collect()
            .await;
        for outcome in outcomes.into_iter().flatten() {
            report.record(outcome);
        }

        if report.processed > 0 || report.load_error.is_some() {
            tracing::debug!(?report, "Blog pass complete");
        }
        report
    }

    /// Makes every queued post due now, then runs a pass.
    pub async fn force_process_queue(&self) -> BlogProcessReport {
        let now = self.clock.now();
        let made_due = self.queue().make_all_due(now);
        self.logger.log(
            LogLevel::Info,
            "Forcing blog queue processing",
            Some(json!({ "made_due": made_due })),
            LogContext::component(COMPONENT),
        );
        self.process_scheduled_blog_posts().await
    }

    pub fn blog_scheduling_stats(&self) -> BlogSchedulingStats {
        let now = self.clock.now();
        let queue = self.queue();
        let mut stats = BlogSchedulingStats {
            queued: queue.entries.len(),
            total_published: self.counters.published.load(Ordering::Relaxed),
            total_failed: self.counters.failed.load(Ordering::Relaxed),
            total_retried: self.counters.retried.load(Ordering::Relaxed),
            automation_failures: self.counters.automation_failures.load(Ordering::Relaxed),
            ..Default::default()
        };
        for entry in queue.entries.values() {
            match entry.status {
                ItemStatus::Processing => stats.processing += 1,
                _ => {
                    stats.pending += 1;
                    if entry.is_ready(now) {
                        stats.ready += 1;
                    }
                    if entry.retry_count > 0 {
                        stats.retrying += 1;
                    }
                    stats.next_due = Some(match stats.next_due {
                        Some(due) => due.min(entry.next_retry),
                        None => entry.next_retry,
                    });
                }
            }
        }
        stats
    }

    pub fn queued_posts(&self) -> Vec<QueueItem> {
        let mut posts: Vec<_> = self.queue().entries.values().cloned().collect();
        posts.sort_by_key(QueueItem::ordering_key);
        posts
    }

    pub async fn health_check(&self) -> HealthReport<BlogSchedulingStats> {
        let mut issues = Vec::new();
        if let Err(err) = self.store.probe().await {
            issues.push(format!("Blog store unreachable: {err}"));
        }
        let now = self.clock.now();
        let timeout = self.config().stuck_timeout();
        let stuck = self
            .queue()
            .entries
            .values()
            .filter(|entry| entry.is_stuck(now, timeout))
            .count();
        if stuck > 0 {
            issues.push(format!("{stuck} blog posts stuck in processing"));
        }
        HealthReport::new(issues, self.blog_scheduling_stats())
    }

    /// Returns `None` when the entry could not be claimed or was taken away while publishing.
    async fn publish_post(
        &self,
        id: ItemId,
        max_in_flight: usize,
        backoff: &BackoffStrategy<Exponential>,
    ) -> Option<PostOutcome> {
        let item = self.queue().claim(&id, self.clock.now(), max_in_flight)?;
        self.logger.log_processing_start(COMPONENT, &item);
        let started = Instant::now();

        let outcome = tokio::spawn({
            let publisher = self.publisher.clone();
            let item = item.clone();
            async move { publisher.publish(&item).await }
        })
        .await
        .unwrap_or_else(PublishOutcome::from);

        match outcome {
            PublishOutcome::Published => {
                // The entry stays queued until the store stops reporting the post as ready.
                let _ = self.store.mark_published(&item.id).await.inspect_err(|err| {
                    tracing::error!(?err, id = %item.id, "Failed to mark blog post {} as published: {err}", item.id);
                });
                self.queue().entries.remove(&item.id);
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                self.logger
                    .log_processing_success(COMPONENT, &item, started.elapsed());
                Some(PostOutcome::Published {
                    automation_failed: !self.run_automation(&item).await,
                })
            }
            PublishOutcome::Failed { error } => {
                let decision = {
                    let mut queue = self.queue();
                    if !queue.owns(&item) {
                        drop(queue);
                        tracing::warn!(id = %item.id, "Ignoring failed publish of blog post {} that is no longer claimed", item.id);
                        return None;
                    }
                    queue.fail(&item.id, &error, backoff, self.clock.now())
                };
                self.logger
                    .log_processing_failure(COMPONENT, &item, &error, &decision);
                match decision {
                    RetryDecision::Exhausted { .. } => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        let _ = self
                            .store
                            .mark_failed(&item.id, &error)
                            .await
                            .inspect_err(|err| {
                                tracing::error!(?err, id = %item.id, "Failed to mark blog post {} as failed: {err}", item.id);
                            });
                        Some(PostOutcome::Failed)
                    }
                    RetryDecision::Retry { .. } => {
                        self.counters.retried.fetch_add(1, Ordering::Relaxed);
                        Some(PostOutcome::Retrying)
                    }
                    RetryDecision::NotFound => None,
                }
            }
        }
    }

    /// Returns `false` if the trigger failed.
    async fn run_automation(&self, item: &QueueItem) -> bool {
        let Some(automation) = &self.automation else {
            return true;
        };
        match automation.on_published(item).await {
            Ok(()) => true,
            Err(err) => {
                self.counters
                    .automation_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.logger.log(
                    LogLevel::Warn,
                    format!("Automation failed for published blog post {}", item.id),
                    Some(json!({ "error": err.to_string() })),
                    LogContext::for_item(COMPONENT, item),
                );
                false
            }
        }
    }

    fn queue(&self) -> MutexGuard<'_, BlogQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::{
        clock::ManualClock,
        config::{LoggingConfig, RetryConfig},
        logger::LogFilter,
        source::{memory::{ContentStatus, InMemorySource}, MockAutomationTrigger},
        testing::{assert_logged, Behaviour, ScriptedPublisher},
    };

    struct Harness {
        scheduler: BlogPostScheduler,
        store: InMemorySource,
        publisher: ScriptedPublisher,
        clock: ManualClock,
    }

    fn harness(publisher: ScriptedPublisher, max_retries: u32) -> Harness {
        harness_with_store(publisher, max_retries, InMemorySource::new())
    }

    fn harness_with_store(
        publisher: ScriptedPublisher,
        max_retries: u32,
        store: InMemorySource,
    ) -> Harness {
        let clock = ManualClock::default();
        let store = store.with_clock(Arc::new(clock.clone()));
        let logger = SchedulerLogger::new(LoggingConfig {
            level: LogLevel::Debug,
            console: false,
            ..Default::default()
        })
        .with_clock(Arc::new(clock.clone()));
        let config = BlogSchedulerConfig {
            retry: RetryConfig::new(max_retries, std::time::Duration::from_secs(5), 2.0),
            ..Default::default()
        };
        let scheduler = BlogPostScheduler::new(config, store.clone(), publisher.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_logger(Arc::new(logger));
        Harness {
            scheduler,
            store,
            publisher,
            clock,
        }
    }

    impl Harness {
        async fn schedule_draft(&self, id: &str, at: DateTime<Utc>) {
            self.store
                .insert_draft(ScheduledContent::new(id, at, json!({ "title": id })))
                .unwrap();
            self.scheduler
                .schedule_blog_post(ScheduledContent::new(id, at, json!({ "title": id })))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn scheduled_post_is_published_when_due() {
        let h = harness(ScriptedPublisher::new(), 3);
        h.schedule_draft("post", h.clock.now() + TimeDelta::minutes(10)).await;

        let early = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!(early.processed, 0);
        assert_eq!(h.scheduler.blog_scheduling_stats().queued, 1);

        h.clock.advance(TimeDelta::minutes(11));
        let report = h.scheduler.process_scheduled_blog_posts().await;

        assert_eq!(report.published, 1);
        assert_eq!(h.publisher.published(), vec![ItemId::from("post")]);
        assert_eq!(h.store.status(&"post".into()), Some(ContentStatus::Published));
        assert!(h.scheduler.queued_posts().is_empty());
        assert_eq!(h.scheduler.blog_scheduling_stats().total_published, 1);
    }

    #[tokio::test]
    async fn rescheduling_moves_a_queued_post() {
        let h = harness(ScriptedPublisher::new(), 3);
        let later = h.clock.now() + TimeDelta::hours(2);
        h.schedule_draft("post", h.clock.now() + TimeDelta::hours(1)).await;

        h.scheduler
            .schedule_blog_post(ScheduledContent::new("post", later, json!({ "title": "v2" })))
            .await
            .unwrap();

        let posts = h.scheduler.queued_posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].scheduled_at, later);
        assert_eq!(posts[0].data, json!({ "title": "v2" }));
        assert_logged!(h.scheduler.logger(), 1 entries containing "Rescheduled blog post post");
    }

    #[tokio::test]
    async fn unschedule_removes_from_queue_and_store() {
        let h = harness(ScriptedPublisher::new(), 3);
        h.schedule_draft("post", h.clock.now()).await;

        assert!(h.scheduler.unschedule_blog_post(&"post".into()).await.unwrap());
        assert_eq!(h.store.status(&"post".into()), Some(ContentStatus::Draft));
        assert!(!h.scheduler.unschedule_blog_post(&"post".into()).await.unwrap());

        let report = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!(report.processed, 0);

        assert_matches!(
            h.scheduler.unschedule_blog_post(&"missing".into()).await,
            Err(BlogSchedulerError::NotScheduled(id)) if id == ItemId::from("missing")
        );
    }

    #[tokio::test]
    async fn schedule_fails_when_store_is_unavailable() {
        let h = harness(ScriptedPublisher::new(), 3);
        h.store.set_unavailable(true);

        let result = h
            .scheduler
            .schedule_blog_post(ScheduledContent::new("post", h.clock.now(), json!({})))
            .await;

        assert_matches!(result, Err(BlogSchedulerError::Store(SourceError::Unavailable(_))));
        assert!(h.scheduler.queued_posts().is_empty());
    }

    #[tokio::test]
    async fn failures_retry_with_backoff_then_give_up() {
        let h = harness(ScriptedPublisher::always(Behaviour::fail("cms down")), 2);
        h.schedule_draft("post", h.clock.now()).await;

        let first = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!(first.retried, 1);
        let retry_at = h.scheduler.queued_posts()[0].next_retry;
        assert_eq!(retry_at - h.clock.now(), TimeDelta::seconds(5));

        assert_eq!(h.scheduler.process_scheduled_blog_posts().await.processed, 0);

        h.clock.advance(TimeDelta::seconds(5));
        let second = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!(second.failed, 1);

        assert!(h.scheduler.queued_posts().is_empty());
        let record = h.store.get(&"post".into()).unwrap();
        assert_eq!(record.status, ContentStatus::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("cms down"));
        assert_logged!(h.scheduler.logger(), 1 entries containing "will retry");
        assert_logged!(h.scheduler.logger(), 1 entries containing "giving up");
    }

    #[tokio::test]
    async fn automation_failure_does_not_undo_publish() {
        let mut automation = MockAutomationTrigger::new();
        automation
            .expect_on_published()
            .times(1)
            .returning(|_| Err(SourceError::Unavailable("social generator offline".to_owned())));
        let h = harness(ScriptedPublisher::new(), 3);
        let Harness {
            scheduler,
            store,
            clock,
            ..
        } = h;
        let scheduler = scheduler.with_automation(automation);
        store
            .insert(ScheduledContent::new("post", clock.now(), json!({})))
            .unwrap();

        let report = scheduler.process_scheduled_blog_posts().await;

        assert_eq!(report.published, 1);
        assert_eq!(report.automation_failures, 1);
        assert_eq!(store.status(&"post".into()), Some(ContentStatus::Published));
        let warnings = scheduler
            .logger()
            .entries_matching(&LogFilter::new().min_level(LogLevel::Warn));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("Automation failed"));
        assert_eq!(scheduler.blog_scheduling_stats().automation_failures, 1);
    }

    #[tokio::test]
    async fn automation_runs_with_the_published_post() {
        let mut automation = MockAutomationTrigger::new();
        automation
            .expect_on_published()
            .withf(|item| item.id == ItemId::from("post") && item.kind == ContentKind::Blog)
            .times(1)
            .returning(|_| Ok(()));
        let h = harness(ScriptedPublisher::new(), 3);
        let scheduler = h.scheduler.with_automation(automation);
        h.store
            .insert(ScheduledContent::new("post", h.clock.now(), json!({})))
            .unwrap();

        let report = scheduler.process_scheduled_blog_posts().await;

        assert_eq!(report.automation_failures, 0);
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn force_process_ignores_backoff() {
        let h = harness(ScriptedPublisher::new(), 3);
        h.publisher.script("post", [Behaviour::fail("timeout")]);
        h.schedule_draft("post", h.clock.now()).await;
        assert_eq!(h.scheduler.process_scheduled_blog_posts().await.retried, 1);

        let report = h.scheduler.force_process_queue().await;

        assert_eq!(report.published, 1);
        assert_eq!(h.publisher.attempts(), 2);
    }

    #[tokio::test]
    async fn concurrency_is_capped() {
        let publisher = ScriptedPublisher::gated();
        let h = harness(publisher.clone(), 3);
        for id in ["a", "b", "c", "d", "e"] {
            h.store
                .insert(ScheduledContent::new(id, h.clock.now(), json!({})))
                .unwrap();
        }

        let pass = tokio::spawn(async move {
            let report = h.scheduler.process_scheduled_blog_posts().await;
            (report, h)
        });
        while publisher.in_flight() < 2 {
            tokio::task::yield_now().await;
        }
        publisher.release(5);
        let (report, _h) = pass.await.unwrap();

        assert_eq!(report.published, 5);
        assert_eq!(publisher.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn waiting_entries_stay_pending_until_claimed() {
        let publisher = ScriptedPublisher::gated();
        let h = Arc::new(harness(publisher.clone(), 3));
        h.scheduler
            .update_config(BlogSchedulerConfig {
                max_concurrent: 1,
                ..h.scheduler.config()
            })
            .unwrap();
        for id in ["a", "b"] {
            h.store
                .insert(ScheduledContent::new(id, h.clock.now(), json!({})))
                .unwrap();
        }

        let pass = tokio::spawn({
            let h = h.clone();
            async move { h.scheduler.process_scheduled_blog_posts().await }
        });
        while publisher.in_flight() < 1 {
            tokio::task::yield_now().await;
        }

        let stats = h.scheduler.blog_scheduling_stats();
        assert_eq!((stats.processing, stats.pending), (1, 1));
        h.clock.advance(TimeDelta::minutes(31));
        let health = h.scheduler.health_check().await;
        assert_eq!(health.issues, vec!["1 blog posts stuck in processing"]);

        publisher.release(2);
        let report = pass.await.unwrap();
        assert_eq!(report.published, 2);
        assert!(h.scheduler.queued_posts().is_empty());
    }

    #[tokio::test]
    async fn overlapping_passes_share_the_cap() {
        let publisher = ScriptedPublisher::gated();
        let h = Arc::new(harness(publisher.clone(), 3));
        for id in ["a", "b", "c"] {
            h.store
                .insert(ScheduledContent::new(id, h.clock.now(), json!({})))
                .unwrap();
        }

        let first = tokio::spawn({
            let h = h.clone();
            async move { h.scheduler.process_scheduled_blog_posts().await }
        });
        while publisher.in_flight() < 2 {
            tokio::task::yield_now().await;
        }
        let second = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!(second.processed, 0);

        publisher.release(3);
        assert_eq!(first.await.unwrap().published, 3);
        assert_eq!(publisher.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn post_stays_queued_until_the_store_records_it() {
        let store = InMemorySource::new().with_publish_latency(std::time::Duration::from_millis(200));
        let h = Arc::new(harness_with_store(ScriptedPublisher::new(), 3, store));
        h.store
            .insert(ScheduledContent::new("post", h.clock.now(), json!({})))
            .unwrap();

        let first = tokio::spawn({
            let h = h.clone();
            async move { h.scheduler.process_scheduled_blog_posts().await }
        });
        while h.publisher.published().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let second = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!((second.enqueued, second.processed), (0, 0));

        assert_eq!(first.await.unwrap().published, 1);
        assert_eq!(h.publisher.published(), vec![ItemId::from("post")]);
        assert_eq!(h.store.status(&"post".into()), Some(ContentStatus::Published));
        assert_eq!(h.scheduler.process_scheduled_blog_posts().await.loaded, 0);
    }

    #[tokio::test]
    async fn stuck_entries_are_reset_and_reported() {
        let h = harness(ScriptedPublisher::new(), 3);
        h.schedule_draft("post", h.clock.now()).await;
        h.scheduler.queue().claim(&"post".into(), h.clock.now(), 1);

        h.clock.advance(TimeDelta::minutes(31));
        let health = h.scheduler.health_check().await;
        assert!(!health.healthy);
        assert_eq!(health.issues, vec!["1 blog posts stuck in processing"]);

        let report = h.scheduler.process_scheduled_blog_posts().await;
        assert_eq!(report.stuck_reset, 1);
        assert_eq!(report.published, 1);
        assert!(h.scheduler.health_check().await.healthy);
    }

    #[tokio::test]
    async fn health_reports_unreachable_store() {
        let h = harness(ScriptedPublisher::new(), 3);
        h.store.set_unavailable(true);

        let health = h.scheduler.health_check().await;

        assert!(!health.healthy);
        assert!(health.issues[0].starts_with("Blog store unreachable"));
        let report = h.scheduler.process_scheduled_blog_posts().await;
        assert!(report.load_error.is_some());
    }
}
