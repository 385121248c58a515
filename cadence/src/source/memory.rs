//! Provides an in memory implementation of [`ContentSource`] and [`BlogStore`].
//!
//! It is intended for tests and demos: records live in a `Vec` behind a lock and every query is
//! a linear scan.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BlogStore, ContentSource, SourceError};
use crate::{
    clock::{self, Clock},
    item::{ItemId, ScheduledContent},
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredContent {
    pub content: ScheduledContent,
    pub status: ContentStatus,
    pub failure_reason: Option<String>,
}

/// An in memory content store.
///
/// Clones share the same records, so a test can keep a handle to inspect statuses after giving
/// the source to a scheduler.
#[derive(Clone)]
pub struct InMemorySource {
    records: Arc<RwLock<Vec<StoredContent>>>,
    unavailable: Arc<AtomicBool>,
    publish_latency: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self {
            records: Default::default(),
            unavailable: Default::default(),
            publish_latency: None,
            clock: clock::system(),
        }
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Makes every `mark_published` call sleep before it writes, like a slow database.
    pub fn with_publish_latency(self, latency: Duration) -> Self {
        Self {
            publish_latency: Some(latency),
            ..self
        }
    }

    /// Adds (or replaces) a record in the scheduled state.
    pub fn insert(&self, content: ScheduledContent) -> Result<(), SourceError> {
        self.upsert(content, ContentStatus::Scheduled)
    }

    /// Adds (or replaces) a record that is not scheduled yet.
    pub fn insert_draft(&self, content: ScheduledContent) -> Result<(), SourceError> {
        self.upsert(content, ContentStatus::Draft)
    }

    pub fn status(&self, id: &ItemId) -> Option<ContentStatus> {
        self.get(id).map(|record| record.status)
    }

    pub fn get(&self, id: &ItemId) -> Option<StoredContent> {
        self.records
            .read()
            .ok()?
            .iter()
            .find(|record| &record.content.id == id)
            .cloned()
    }

    pub fn records(&self) -> Vec<StoredContent> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// While unavailable every call fails with [`SourceError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(SourceError::Unavailable(
                "in memory source switched off".to_owned(),
            ))
        } else {
            Ok(())
        }
    }

    fn upsert(&self, content: ScheduledContent, status: ContentStatus) -> Result<(), SourceError> {
        let mut records = self.records.write().map_err(|_| SourceError::BadState)?;
        let record = StoredContent {
            content,
            status,
            failure_reason: None,
        };
        match records
            .iter_mut()
            .find(|existing| existing.content.id == record.content.id)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    fn update(
        &self,
        id: &ItemId,
        update: impl FnOnce(&mut StoredContent),
    ) -> Result<(), SourceError> {
        self.check_available()?;
        let mut records = self.records.write().map_err(|_| SourceError::BadState)?;
        match records.iter_mut().find(|record| &record.content.id == id) {
            None => Err(SourceError::NotFound(id.clone())),
            Some(record) => {
                update(record);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ContentSource for InMemorySource {
    async fn ready_items(&self) -> Result<Vec<ScheduledContent>, SourceError> {
        self.check_available()?;
        let now = self.clock.now();
        let records = self.records.read().map_err(|_| SourceError::BadState)?;
        Ok(records
            .iter()
            .filter(|record| {
                record.status == ContentStatus::Scheduled && record.content.scheduled_at <= now
            })
            .map(|record| record.content.clone())
            .collect())
    }

    async fn mark_failed(&self, id: &ItemId, reason: &str) -> Result<(), SourceError> {
        self.update(id, |record| {
            record.status = ContentStatus::Failed;
            record.failure_reason = Some(reason.to_owned());
        })
    }

    async fn mark_published(&self, id: &ItemId) -> Result<(), SourceError> {
        if let Some(latency) = self.publish_latency {
            tokio::time::sleep(latency).await;
        }
        self.update(id, |record| record.status = ContentStatus::Published)
    }

    async fn probe(&self) -> Result<(), SourceError> {
        self.check_available()?;
        self.records
            .read()
            .map(|_| ())
            .map_err(|_| SourceError::BadState)
    }
}

#[async_trait]
impl BlogStore for InMemorySource {
    async fn schedule(&self, id: &ItemId, scheduled_at: DateTime<Utc>) -> Result<(), SourceError> {
        self.update(id, |record| {
            record.content.scheduled_at = scheduled_at;
            record.status = ContentStatus::Scheduled;
            record.failure_reason = None;
        })
    }

    async fn unschedule(&self, id: &ItemId) -> Result<(), SourceError> {
        self.update(id, |record| record.status = ContentStatus::Draft)
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn source() -> (InMemorySource, ManualClock) {
        let clock = ManualClock::default();
        (
            InMemorySource::new().with_clock(Arc::new(clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn only_due_scheduled_records_are_ready() {
        let (source, clock) = source();
        let now = clock.now();
        source
            .insert(ScheduledContent::new("due", now - TimeDelta::minutes(5), json!({})))
            .unwrap();
        source
            .insert(ScheduledContent::new("later", now + TimeDelta::hours(1), json!({})))
            .unwrap();
        source
            .insert_draft(ScheduledContent::new("draft", now - TimeDelta::hours(1), json!({})))
            .unwrap();

        let ready = source.ready_items().await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, ItemId::from("due"));

        clock.advance(TimeDelta::hours(2));
        assert_eq!(source.ready_items().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn published_and_failed_records_are_no_longer_ready() {
        let (source, clock) = source();
        let past = clock.now() - TimeDelta::minutes(1);
        source.insert(ScheduledContent::new("a", past, json!({}))).unwrap();
        source.insert(ScheduledContent::new("b", past, json!({}))).unwrap();

        source.mark_published(&ItemId::from("a")).await.unwrap();
        source.mark_failed(&ItemId::from("b"), "gave up").await.unwrap();

        assert!(source.ready_items().await.unwrap().is_empty());
        assert_eq!(source.status(&"a".into()), Some(ContentStatus::Published));
        let failed = source.get(&"b".into()).unwrap();
        assert_eq!(failed.status, ContentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("gave up"));
    }

    #[tokio::test]
    async fn unavailable_source_errors() {
        let (source, _clock) = source();
        source.set_unavailable(true);

        assert_matches!(source.ready_items().await, Err(SourceError::Unavailable(_)));
        assert_matches!(source.probe().await, Err(SourceError::Unavailable(_)));

        source.set_unavailable(false);
        assert_matches!(source.probe().await, Ok(()));
    }

    #[tokio::test]
    async fn schedule_and_unschedule_blog_posts() {
        let (source, clock) = source();
        let id = ItemId::from("post");
        source
            .insert_draft(ScheduledContent::new("post", clock.now(), json!({ "title": "Hi" })))
            .unwrap();

        source.schedule(&id, clock.now()).await.unwrap();
        assert_eq!(source.ready_items().await.unwrap().len(), 1);

        source.unschedule(&id).await.unwrap();
        assert_eq!(source.status(&id), Some(ContentStatus::Draft));
        assert!(source.ready_items().await.unwrap().is_empty());

        assert_matches!(
            source.schedule(&ItemId::from("missing"), clock.now()).await,
            Err(SourceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn badstate_errors() {
        let (source, _clock) = source();
        tokio::task::spawn({
            let source = source.clone();
            async move {
                let _guard = source.records.write();
                panic!()
            }
        })
        .await
        .unwrap_err();

        assert_matches!(source.ready_items().await, Err(SourceError::BadState));
        assert_matches!(
            source.mark_failed(&ItemId::from("a"), "x").await,
            Err(SourceError::BadState)
        );
        assert_matches!(
            source.insert(ScheduledContent::new("a", Utc::now(), json!({}))),
            Err(SourceError::BadState)
        );
    }
}
