use std::{
    sync::{atomic::Ordering, Arc},
    time::Instant,
};

use serde_json::json;

use super::{ContentScheduler, Inner, COMPONENT};
use crate::{
    blog::BlogPostScheduler,
    item::{ItemId, QueueItem},
    logger::{LogContext, LogLevel},
    queue::RetryDecision,
    source::PublishOutcome,
};

/// An item claimed from the queue together with the slot it occupies.
pub(super) struct Job {
    pub(super) slot: u64,
    pub(super) item: QueueItem,
}

/// Frees the job's concurrency slot however the job ends, unless a stuck reset already handed
/// the item to another job.
struct ActiveSlot {
    inner: Arc<Inner>,
    id: ItemId,
    slot: u64,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let mut active = self.inner.active_jobs();
        if active.get(&self.id) == Some(&self.slot) {
            active.remove(&self.id);
        }
    }
}

/// Counts a running blog pass until dropped.
struct BlogPassRunning(Arc<Inner>);

impl BlogPassRunning {
    fn new(inner: Arc<Inner>) -> Self {
        inner.blog_passes.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for BlogPassRunning {
    fn drop(&mut self) {
        self.0.blog_passes.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContentScheduler {
    /// Runs a blog pass in its own task so a slow publish never holds up the cycle.
    pub(super) fn spawn_blog_pass(&self, blog: Arc<BlogPostScheduler>) {
        let running = BlogPassRunning::new(self.inner.clone());
        tokio::spawn(async move {
            let pass = tokio::spawn(async move { blog.process_scheduled_blog_posts().await });
            match pass.await {
                Ok(report) => *running.0.last_blog_pass() = Some(report),
                Err(err) => {
                    tracing::error!(?err, "Blog pass failed: {err}");
                    running.0.logger.error(
                        format!("Blog pass failed: {err}"),
                        LogContext::component(COMPONENT),
                    );
                }
            }
        });
    }

    pub(super) async fn run_job(self, job: Job) {
        let slot = ActiveSlot {
            inner: self.inner.clone(),
            id: job.item.id.clone(),
            slot: job.slot,
        };
        let item = job.item;
        self.inner.logger.log_processing_start(COMPONENT, &item);
        let started = Instant::now();

        let outcome = match self.inner.channels.get(&item.kind) {
            Some(channel) => tokio::spawn({
                let publisher = channel.publisher.clone();
                let item = item.clone();
                async move { publisher.publish(&item).await }
            })
            .await
            .unwrap_or_else(PublishOutcome::from),
            None => PublishOutcome::failed(format!(
                "No publisher registered for {} content",
                item.kind
            )),
        };

        match outcome {
            PublishOutcome::Published => {
                self.handle_success(&slot, &item, started).await;
            }
            PublishOutcome::Failed { error } => self.handle_failure(&slot, &item, &error).await,
        }
    }

    async fn handle_success(&self, slot: &ActiveSlot, item: &QueueItem, started: Instant) {
        let id = &item.id;
        // The item stays queued until its source stops reporting it as ready.
        if let Some(channel) = self.inner.channels.get(&item.kind) {
            let _ = channel.source.mark_published(id).await.inspect_err(|err| {
                tracing::error!(?err, %id, "Failed to mark {} item {id} as published: {err}", item.kind)
            });
        }

        {
            let active = self.inner.active_jobs();
            let claimed_elsewhere = active.get(id).is_some_and(|owner| *owner != slot.slot);
            if claimed_elsewhere {
                tracing::warn!(%id, "Item {id} was published by a job that had been reset as stuck");
            } else if !self.inner.queue().mark_completed(id) {
                tracing::warn!(%id, "Published item {id} was no longer queued");
            }
        }
        self.inner.counters.record_success();
        self.inner
            .logger
            .log_processing_success(COMPONENT, item, started.elapsed());
    }

    async fn handle_failure(&self, slot: &ActiveSlot, item: &QueueItem, error: &str) {
        let id = &item.id;
        let decision = {
            let active = self.inner.active_jobs();
            if active.get(id) != Some(&slot.slot) {
                drop(active);
                tracing::warn!(%id, "Ignoring failure of item {id} from a job that had been reset as stuck: {error}");
                return;
            }
            self.inner.queue().mark_failed(id, error)
        };
        self.inner
            .logger
            .log_processing_failure(COMPONENT, item, error, &decision);

        match decision {
            RetryDecision::Retry { next_retry, .. } => {
                self.inner.counters.record_retry();
                tracing::warn!(%id, %next_retry, "Item {id} failed and will be retried: {error}");
            }
            RetryDecision::Exhausted { attempts } => {
                self.inner.counters.record_failure();
                tracing::error!(%id, attempts, "Item {id} failed and will be discarded: {error}");
                let Some(channel) = self.inner.channels.get(&item.kind) else {
                    return;
                };
                let _ = channel
                    .source
                    .mark_failed(id, error)
                    .await
                    .inspect_err(|err| {
                        tracing::error!(?err, %id, "Failed to mark {} item {id} as failed: {err}", item.kind);
                        self.inner.logger.log(
                            LogLevel::Error,
                            format!("Failed to mark {} item {id} as failed", item.kind),
                            Some(json!({ "error": err.to_string() })),
                            LogContext::for_item(COMPONENT, item),
                        );
                    });
            }
            RetryDecision::NotFound => {
                tracing::warn!(%id, "Failed item {id} was no longer queued");
            }
        }
    }
}
