//! Helpers for testing code built on the schedulers.
//!
//! [`ScriptedPublisher`] is a [`Publisher`] whose behaviour can be set per item, and which
//! records what it was asked to do. It can also be gated so that publishes block until the test
//! releases them, which makes it possible to observe jobs while they are in flight.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! use cadence::prelude::*;
//! use cadence::testing::{Behaviour, ScriptedPublisher};
//! use chrono::{TimeDelta, Utc};
//! use serde_json::json;
//!
//! let source = InMemorySource::new();
//! source.insert(ScheduledContent::new("s1", Utc::now() - TimeDelta::minutes(5), json!({}))).unwrap();
//! source.insert(ScheduledContent::new("s2", Utc::now() - TimeDelta::minutes(5), json!({}))).unwrap();
//!
//! let publisher = ScriptedPublisher::new();
//! publisher.script("s2", [Behaviour::fail("rate limited")]);
//!
//! let scheduler = ContentScheduler::builder(SchedulerConfig::default())
//!     .with_channel(ContentKind::Social, source, publisher.clone())
//!     .build()
//!     .unwrap();
//!
//! scheduler.force_process().await;
//!
//! assert_eq!(publisher.published(), vec![ItemId::from("s1")]);
//! assert_eq!(publisher.attempts(), 2);
//! # });
//! ```
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use fxhash::FxHashMap;
use tokio::sync::Semaphore;

use crate::{
    item::{ItemId, QueueItem},
    source::{PublishOutcome, Publisher},
};

/// What a [`ScriptedPublisher`] does for one publish call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Behaviour {
    #[default]
    Succeed,
    Fail(String),
    Panic,
    /// Never completes.
    Hang,
}

impl Behaviour {
    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

#[derive(Default)]
struct State {
    fallback: Behaviour,
    scripts: FxHashMap<ItemId, VecDeque<Behaviour>>,
    published: Vec<ItemId>,
    failures: Vec<(ItemId, String)>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    gate: Option<Semaphore>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A publisher with scripted outcomes. Clones share their state.
#[derive(Clone, Default)]
pub struct ScriptedPublisher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScriptedPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPublisher")
            .field("attempts", &self.attempts())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl ScriptedPublisher {
    /// A publisher that succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that behaves as `behaviour` for every item without a script.
    pub fn always(behaviour: Behaviour) -> Self {
        let publisher = Self::default();
        publisher.state().fallback = behaviour;
        publisher
    }

    /// A publisher where every call waits for a permit from [`ScriptedPublisher::release`]
    /// before acting.
    pub fn gated() -> Self {
        Self {
            inner: Arc::new(Inner {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }),
        }
    }

    /// Queues behaviours for the next calls for `id`. Once used up the fallback applies.
    pub fn script(&self, id: impl Into<ItemId>, behaviours: impl IntoIterator<Item = Behaviour>) {
        self.state()
            .scripts
            .entry(id.into())
            .or_default()
            .extend(behaviours);
    }

    /// Lets `permits` gated calls proceed.
    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(permits);
        }
    }

    /// Ids that were successfully published, in order.
    pub fn published(&self) -> Vec<ItemId> {
        self.state().published.clone()
    }

    /// Ids and errors of failed calls, in order. Panics are not included.
    pub fn failures(&self) -> Vec<(ItemId, String)> {
        self.state().failures.clone()
    }

    /// Total number of publish calls started.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// The highest number of calls that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_behaviour(&self, id: &ItemId) -> Behaviour {
        let mut state = self.state();
        match state.scripts.get_mut(id).and_then(VecDeque::pop_front) {
            Some(behaviour) => behaviour,
            None => state.fallback.clone(),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, item: &QueueItem) -> PublishOutcome {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.inner.in_flight);

        if let Some(gate) = &self.inner.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return PublishOutcome::failed("publisher gate closed"),
            }
        }

        match self.next_behaviour(&item.id) {
            Behaviour::Succeed => {
                self.state().published.push(item.id.clone());
                PublishOutcome::Published
            }
            Behaviour::Fail(error) => {
                self.state().failures.push((item.id.clone(), error.clone()));
                PublishOutcome::Failed { error }
            }
            Behaviour::Panic => panic!("scripted panic for {}", item.id),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

/// Asserts on the entries held by a [`crate::logger::SchedulerLogger`].
///
/// ```
/// # use cadence::prelude::*;
/// # use cadence::testing::assert_logged;
/// let logger = SchedulerLogger::default();
/// logger.warn("Publishing failed, will retry", LogContext::component("scheduler"));
/// logger.warn("Publishing failed, will retry", LogContext::component("scheduler"));
///
/// assert_logged!(logger, 2 entries containing "will retry");
/// assert_logged!(logger, 0 entries containing "giving up");
/// ```
#[macro_export]
macro_rules! assert_logged {
    ($logger:expr, $n:literal entries containing $needle:expr) => {
        $crate::assert_logged!(@check $logger, $n, $crate::logger::LogFilter::new(), $needle)
    };
    ($logger:expr, $n:literal entries for $id:expr, containing $needle:expr) => {
        $crate::assert_logged!(@check $logger, $n, $crate::logger::LogFilter::new().item($id), $needle)
    };
    (@check $logger:expr, $n:expr, $filter:expr, $needle:expr) => {{
        let entries = $logger.entries_matching(&$filter);
        let matching = entries
            .iter()
            .filter(|entry| entry.message.contains($needle))
            .count();
        assert!(
            matching == $n,
            "Expected {} log entries containing {:?}, found {}\n\nAll entries:\n{:#?}",
            $n,
            $needle,
            matching,
            entries,
        );
    }};
}

pub use crate::assert_logged;

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::item::ContentKind;

    fn item(id: &str) -> QueueItem {
        QueueItem::raw_item(id, ContentKind::Social, Utc::now())
    }

    #[tokio::test]
    async fn scripts_apply_before_fallback() {
        let publisher = ScriptedPublisher::always(Behaviour::fail("down"));
        publisher.script("a", [Behaviour::Succeed]);

        assert!(publisher.publish(&item("a")).await.is_published());
        assert_eq!(
            publisher.publish(&item("a")).await,
            PublishOutcome::failed("down")
        );
        assert_eq!(publisher.published(), vec![ItemId::from("a")]);
        assert_eq!(publisher.failures(), vec![(ItemId::from("a"), "down".to_owned())]);
        assert_eq!(publisher.attempts(), 2);
        assert_eq!(publisher.in_flight(), 0);
    }

    #[tokio::test]
    async fn gated_calls_wait_for_release() {
        let publisher = ScriptedPublisher::gated();
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let publisher = publisher.clone();
                tokio::spawn(async move { publisher.publish(&item(id)).await })
            })
            .collect();

        while publisher.in_flight() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(publisher.published().is_empty());

        publisher.release(2);
        for handle in handles {
            assert!(handle.await.unwrap().is_published());
        }
        assert_eq!(publisher.max_in_flight(), 2);
        assert_eq!(publisher.in_flight(), 0);
    }

    #[tokio::test]
    async fn panics_propagate_to_the_task() {
        let publisher = ScriptedPublisher::always(Behaviour::Panic);

        let result = tokio::spawn(async move { publisher.publish(&item("a")).await }).await;

        assert!(result.unwrap_err().is_panic());
    }
}
