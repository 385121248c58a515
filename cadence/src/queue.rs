//! The in-memory retry queue.
//!
//! [`SchedulerQueue`] owns the live items (pending or processing) keyed by [`ItemId`] and a
//! bounded history of items that reached a final status. None of its operations fail: every
//! transition reports whether it applied via its return value so that a single bad transition
//! can never leave the queue in an inconsistent state.
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use fxhash::FxHashMap;
use serde::Serialize;

use crate::{
    backoff::{BackoffStrategy, Exponential, Strategy},
    clock::{self, Clock},
    config::RetryConfig,
    item::{ContentKind, ItemId, ItemStatus, QueueItem},
};

/// The outcome of [`SchedulerQueue::mark_failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The item went back to pending and becomes eligible again at `next_retry`.
    Retry {
        attempt: u32,
        next_retry: DateTime<Utc>,
    },
    /// Retries are used up. The item is failed and was moved to the history.
    Exhausted { attempts: u32 },
    NotFound,
}

impl RetryDecision {
    pub fn will_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub by_kind: BTreeMap<ContentKind, usize>,
}

pub struct SchedulerQueue {
    items: FxHashMap<ItemId, QueueItem>,
    history: VecDeque<QueueItem>,
    history_capacity: usize,
    backoff: BackoffStrategy<Exponential>,
    next_sequence: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SchedulerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerQueue")
            .field("items", &self.items.len())
            .field("history", &self.history.len())
            .field("history_capacity", &self.history_capacity)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Default for SchedulerQueue {
    fn default() -> Self {
        Self::new(
            RetryConfig::default().strategy(),
            Self::DEFAULT_HISTORY_CAPACITY,
        )
    }
}

impl SchedulerQueue {
    pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

    pub fn new(backoff: BackoffStrategy<Exponential>, history_capacity: usize) -> Self {
        Self {
            items: Default::default(),
            history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
            backoff,
            next_sequence: 0,
            clock: clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_backoff(&mut self, backoff: BackoffStrategy<Exponential>) {
        self.backoff = backoff;
    }

    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.history_capacity = capacity.max(1);
        self.trim_history();
    }

    /// Inserts `item` as pending.
    ///
    /// Returns `false` and leaves the queue untouched if an item with the same id is already
    /// live.
    pub fn add(&mut self, mut item: QueueItem) -> bool {
        if self.items.contains_key(&item.id) {
            return false;
        }
        item.status = ItemStatus::Pending;
        item.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.items.insert(item.id.clone(), item);
        true
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&QueueItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The ready pending item with the lowest priority value, ties broken by insertion order.
    pub fn get_next(&self) -> Option<QueueItem> {
        let now = self.clock.now();
        self.items
            .values()
            .filter(|item| item.is_ready(now))
            .min_by_key(|item| item.ordering_key())
            .cloned()
    }

    pub fn mark_processing(&mut self, id: &ItemId) -> bool {
        let now = self.clock.now();
        match self.items.get_mut(id) {
            Some(item) if item.status == ItemStatus::Pending => {
                item.status = ItemStatus::Processing;
                item.last_attempt = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn mark_completed(&mut self, id: &ItemId) -> bool {
        match self.items.remove(id) {
            None => false,
            Some(mut item) => {
                item.status = ItemStatus::Completed;
                self.push_history(item);
                true
            }
        }
    }

    pub fn mark_failed(&mut self, id: &ItemId, error: impl Into<String>) -> RetryDecision {
        let now = self.clock.now();
        let Some(item) = self.items.get_mut(id) else {
            return RetryDecision::NotFound;
        };
        item.retry_count = item.retry_count.saturating_add(1);
        item.last_error = Some(error.into());

        if item.retry_count >= item.max_retries {
            let attempts = item.retry_count;
            if let Some(mut item) = self.items.remove(id) {
                item.status = ItemStatus::Failed;
                self.push_history(item);
            }
            RetryDecision::Exhausted { attempts }
        } else {
            let delay = self.backoff.backoff(item.retry_count).max(TimeDelta::zero());
            item.next_retry = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
            item.status = ItemStatus::Pending;
            RetryDecision::Retry {
                attempt: item.retry_count,
                next_retry: item.next_retry,
            }
        }
    }

    /// Drops a live item without recording it in the history.
    pub fn remove(&mut self, id: &ItemId) -> Option<QueueItem> {
        self.items.remove(id)
    }

    /// Items that have been processing for longer than `timeout`.
    pub fn stuck_items(&self, timeout: TimeDelta) -> Vec<QueueItem> {
        let now = self.clock.now();
        self.items
            .values()
            .filter(|item| item.is_stuck(now, timeout))
            .cloned()
            .collect()
    }

    /// Puts stuck items back to pending, due immediately. Returns the ids that were reset.
    pub fn reset_stuck_items(&mut self, timeout: TimeDelta) -> Vec<ItemId> {
        let now = self.clock.now();
        let mut reset = Vec::new();
        for item in self.items.values_mut() {
            if item.is_stuck(now, timeout) {
                item.status = ItemStatus::Pending;
                item.next_retry = now;
                reset.push(item.id.clone());
            }
        }
        reset
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for item in self.items.values().chain(self.history.iter()) {
            stats.total += 1;
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
            *stats.by_kind.entry(item.kind).or_default() += 1;
        }
        stats
    }

    /// Live items in processing order.
    pub fn items(&self) -> Vec<QueueItem> {
        let mut items: Vec<_> = self.items.values().cloned().collect();
        items.sort_by_key(QueueItem::ordering_key);
        items
    }

    /// Finished items, oldest first.
    pub fn history(&self) -> Vec<QueueItem> {
        self.history.iter().cloned().collect()
    }

    fn push_history(&mut self, item: QueueItem) {
        self.history.push_back(item);
        self.trim_history();
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }
}
