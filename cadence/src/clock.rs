//! Time sources for the schedulers.
//!
//! Everything that compares against "now" (readiness, backoff, stuck detection, log windows)
//! reads the time through a [`Clock`] so that tests can drive time explicitly with a
//! [`ManualClock`].
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to a scheduler and keep
/// another to advance it.
///
/// # Example
///
/// ```
/// # use cadence::clock::{Clock, ManualClock};
/// # use chrono::TimeDelta;
/// let clock = ManualClock::default();
/// let start = clock.now();
///
/// clock.advance(TimeDelta::minutes(5));
///
/// assert_eq!(clock.now() - start, TimeDelta::minutes(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The clock used when none is configured.
pub(crate) fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();

        assert!(second >= first);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let handle = clock.clone();
        let start = clock.now();

        handle.advance(TimeDelta::seconds(90));

        assert_eq!(clock.now(), start + TimeDelta::seconds(90));

        let later = start + TimeDelta::days(1);
        handle.set(later);
        assert_eq!(clock.now(), later);
    }
}
