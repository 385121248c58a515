//! The collaborators the schedulers depend on.
//!
//! The schedulers do not own any content. They ask a [`ContentSource`] for records that are due,
//! hand each record to a [`Publisher`], and report permanent failures back to the source. The
//! blog scheduler additionally records schedules in a [`BlogStore`] and notifies an
//! [`AutomationTrigger`] after publishing.
//!
//! [`memory::InMemorySource`] is a complete in-memory implementation of the source traits.
use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinError;

use crate::item::{ItemId, QueueItem, ScheduledContent};

pub mod memory;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Content source unavailable: {0}")]
    Unavailable(String),
    #[error("Content {0} not found")]
    NotFound(ItemId),
    #[error("Content source in bad state")]
    BadState,
}

/// Data access for one kind of content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Records whose scheduled time has passed and which are still awaiting publication.
    async fn ready_items(&self) -> Result<Vec<ScheduledContent>, SourceError>;

    /// Moves a record to its terminal failed state after its retries are used up.
    async fn mark_failed(&self, id: &ItemId, reason: &str) -> Result<(), SourceError>;

    /// Called after a successful publish so the record stops being reported as ready.
    ///
    /// Publishers that update the record themselves can rely on the default, which does
    /// nothing.
    async fn mark_published(&self, _id: &ItemId) -> Result<(), SourceError> {
        Ok(())
    }

    /// A cheap read used by health checks to see whether the source is reachable.
    async fn probe(&self) -> Result<(), SourceError> {
        self.ready_items().await.map(|_| ())
    }
}

/// Blog content additionally keeps its schedule in the store.
#[async_trait]
pub trait BlogStore: ContentSource {
    async fn schedule(&self, id: &ItemId, scheduled_at: DateTime<Utc>) -> Result<(), SourceError>;

    async fn unschedule(&self, id: &ItemId) -> Result<(), SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Failed { error: String },
}

impl PublishOutcome {
    pub fn failed(error: impl Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published)
    }
}

impl<E> From<Result<(), E>> for PublishOutcome
where
    E: Display,
{
    fn from(value: Result<(), E>) -> Self {
        match value {
            Ok(()) => Self::Published,
            Err(error) => Self::failed(error),
        }
    }
}

/// A publish task that panicked or was aborted.
impl From<JoinError> for PublishOutcome {
    fn from(value: JoinError) -> Self {
        let msg = value.to_string();
        let error = match value.try_into_panic() {
            Ok(panic) => panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .map(|message| format!("Publisher panicked: {message}"))
                .unwrap_or(msg),
            Err(_) => msg,
        };
        Self::Failed { error }
    }
}

/// Performs the actual external send for one kind of content.
///
/// Ordinary failures should be reported as [`PublishOutcome::Failed`]. A panic is caught by the
/// scheduler and treated as a failure too.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, item: &QueueItem) -> PublishOutcome;
}

/// Side effect run after a blog post is published. Failures are logged and never undo the
/// publish.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutomationTrigger: Send + Sync {
    async fn on_published(&self, item: &QueueItem) -> Result<(), SourceError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn outcome_from_result() {
        assert_eq!(
            PublishOutcome::from(Ok::<(), String>(())),
            PublishOutcome::Published
        );
        assert_eq!(
            PublishOutcome::from(Err::<(), _>(SourceError::BadState)),
            PublishOutcome::Failed {
                error: "Content source in bad state".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn panicking_task_becomes_failed_outcome() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();

        assert_eq!(
            PublishOutcome::from(err),
            PublishOutcome::Failed {
                error: "Publisher panicked: boom".to_owned()
            }
        );
    }

    struct Unreachable;

    #[async_trait]
    impl ContentSource for Unreachable {
        async fn ready_items(&self) -> Result<Vec<ScheduledContent>, SourceError> {
            Err(SourceError::Unavailable("connection refused".to_owned()))
        }

        async fn mark_failed(&self, id: &ItemId, _reason: &str) -> Result<(), SourceError> {
            Err(SourceError::NotFound(id.clone()))
        }
    }

    #[tokio::test]
    async fn default_probe_reads_ready_items() {
        assert_eq!(
            Unreachable.probe().await,
            Err(SourceError::Unavailable("connection refused".to_owned()))
        );
        assert_eq!(Unreachable.mark_published(&ItemId::from("s1")).await, Ok(()));
    }
}
