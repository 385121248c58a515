//! The global scheduler.
//!
//! Applications that want a single process-wide scheduler can register one with
//! [`ContentScheduler::set_global`] and reach it from anywhere via [`GlobalScheduler::as_ref`].
//! Tests and embedders that need several schedulers should pass handles around instead.
use tokio::sync::OnceCell;

use crate::{scheduler::ContentScheduler, CadenceError};

/// The process-wide scheduler.
pub struct GlobalScheduler;

static GLOBAL_SCHEDULER: OnceCell<ContentScheduler> = OnceCell::const_new();

impl GlobalScheduler {
    /// This should only be called once. A second call returns [`CadenceError::GlobalScheduler`].
    pub(crate) fn set(scheduler: ContentScheduler) -> Result<(), CadenceError> {
        GLOBAL_SCHEDULER.set(scheduler).map_err(|err| {
            tracing::error!(%err, "Couldn't set global scheduler {err}");
            CadenceError::GlobalScheduler
        })
    }

    /// Get a reference to the global scheduler.
    ///
    /// Example
    ///
    /// Calling [`GlobalScheduler::as_ref`] before setting the scheduler returns an error
    ///
    /// ```
    /// use cadence::global::GlobalScheduler;
    /// use cadence::CadenceError;
    ///
    /// let result = GlobalScheduler::as_ref();
    ///
    /// assert!(matches!(result, Err(CadenceError::GlobalScheduler)));
    /// ```
    pub fn as_ref() -> Result<&'static ContentScheduler, CadenceError> {
        GLOBAL_SCHEDULER.get().ok_or(CadenceError::GlobalScheduler)
    }
}

impl ContentScheduler {
    /// Registers a handle to this scheduler as the global scheduler.
    pub fn set_global(self) -> Result<Self, CadenceError> {
        GlobalScheduler::set(self.clone())?;
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::config::SchedulerConfig;

    // The only test touching the global cell, since it cannot be reset.
    #[tokio::test]
    async fn global_scheduler_can_only_be_set_once() {
        let scheduler = ContentScheduler::builder(SchedulerConfig::default())
            .build()
            .unwrap();

        let scheduler = scheduler.set_global().unwrap();
        assert!(!GlobalScheduler::as_ref().unwrap().is_running());

        let other = ContentScheduler::builder(SchedulerConfig::default())
            .build()
            .unwrap();
        assert_matches!(other.set_global(), Err(CadenceError::GlobalScheduler));
        assert!(!scheduler.is_running());
    }
}
