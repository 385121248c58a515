use std::fmt::Display;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a piece of content.
///
/// This is the id of the underlying record (a post, a campaign), not of a queue entry, so it
/// stays the same across retries.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for ItemId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The kinds of content the schedulers know how to publish.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Social,
    Newsletter,
    Blog,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [Self::Social, Self::Newsletter, Self::Blog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Social => "social",
            Self::Newsletter => "newsletter",
            Self::Blog => "blog",
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A content record that a source reports as due (or soon due) for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledContent {
    pub id: ItemId,
    pub scheduled_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ScheduledContent {
    pub fn new(
        id: impl Into<ItemId>,
        scheduled_at: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            scheduled_at,
            data,
        }
    }
}

/// The unit of work held by [`crate::queue::SchedulerQueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub kind: ContentKind,
    pub data: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    /// Lower values are processed first. See [`priority_for`].
    pub priority: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub status: ItemStatus,
    /// Insertion order, assigned by the queue. Breaks exact priority ties.
    pub sequence: u64,
}

impl QueueItem {
    pub fn new(
        kind: ContentKind,
        content: ScheduledContent,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            priority: priority_for(content.scheduled_at, now),
            id: content.id,
            kind,
            data: content.data,
            scheduled_at: content.scheduled_at,
            retry_count: 0,
            max_retries,
            next_retry: content.scheduled_at.max(now),
            created_at: now,
            last_attempt: None,
            last_error: None,
            status: ItemStatus::Pending,
            sequence: 0,
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == ItemStatus::Pending && self.next_retry <= now
    }

    /// Processing for longer than `timeout`, measured from the last attempt.
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        self.status == ItemStatus::Processing
            && now - self.last_attempt.unwrap_or(self.created_at) > timeout
    }

    pub(crate) fn ordering_key(&self) -> (i64, u64) {
        (self.priority, self.sequence)
    }
}

/// Computes the priority of an item scheduled at `scheduled_at`.
///
/// Overdue items get `-overdue_ms`, so the most overdue sorts first. Items not yet due get
/// their scheduled timestamp in milliseconds, so earlier ones sort first among themselves.
pub fn priority_for(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let overdue = (now - scheduled_at).num_milliseconds().max(0);
    if overdue > 0 {
        -overdue
    } else {
        scheduled_at.timestamp_millis()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use serde_json::json;

    use super::*;

    impl QueueItem {
        pub(crate) fn raw_item(id: &str, kind: ContentKind, now: DateTime<Utc>) -> Self {
            Self::new(
                kind,
                ScheduledContent::new(id, now - TimeDelta::minutes(1), json!({ "id": id })),
                3,
                now,
            )
        }

        pub(crate) fn with_max_retries(self, max_retries: u32) -> Self {
            Self {
                max_retries,
                ..self
            }
        }

        pub(crate) fn with_scheduled_at(self, scheduled_at: DateTime<Utc>) -> Self {
            Self {
                scheduled_at,
                priority: priority_for(scheduled_at, self.created_at),
                ..self
            }
        }
    }

    #[test]
    fn more_overdue_items_have_lower_priority() {
        let now = Utc::now();
        let ten_minutes = priority_for(now - TimeDelta::minutes(10), now);
        let one_minute = priority_for(now - TimeDelta::minutes(1), now);

        assert_eq!(ten_minutes, -600_000);
        assert!(ten_minutes < one_minute);
    }

    #[test]
    fn future_items_use_scheduled_timestamp() {
        let now = Utc::now();
        let scheduled_at = now + TimeDelta::hours(1);

        assert_eq!(
            priority_for(scheduled_at, now),
            scheduled_at.timestamp_millis()
        );
        assert!(priority_for(now - TimeDelta::seconds(1), now) < priority_for(scheduled_at, now));
    }

    #[test]
    fn new_item_is_pending_and_ready() {
        let now = Utc::now();
        let item = QueueItem::raw_item("s1", ContentKind::Social, now);

        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(item.is_ready(now));
        assert!(!item.is_ready(now - TimeDelta::seconds(1)));
    }

    #[test]
    fn future_item_waits_for_its_schedule() {
        let now = Utc::now();
        let scheduled_at = now + TimeDelta::minutes(10);
        let item = QueueItem::new(
            ContentKind::Blog,
            ScheduledContent::new("b1", scheduled_at, json!({})),
            3,
            now,
        );

        assert!(!item.is_ready(now));
        assert!(item.is_ready(scheduled_at));
    }

    #[test]
    fn kinds_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(ContentKind::Newsletter).unwrap(),
            json!("newsletter")
        );
        assert_eq!(ContentKind::Blog.to_string(), "blog");
    }
}
