//! The purpose of this module is to alleviate the need to import many of the `[cadence]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use cadence::prelude::*;
//! ```
pub use crate::backoff::BackoffStrategy;
pub use crate::backoff::Jitter;
pub use crate::backoff::Strategy;
pub use crate::blog::{BlogPostScheduler, BlogSchedulerError};
pub use crate::clock::{Clock, ManualClock};
pub use crate::config::{BlogSchedulerConfig, LoggingConfig, RetryConfig, SchedulerConfig};
pub use crate::item::{ContentKind, ItemId, ItemStatus, QueueItem, ScheduledContent};
pub use crate::logger::{LogContext, LogFilter, LogLevel, SchedulerLogger};
pub use crate::scheduler::HealthReport;
pub use crate::source::memory::{ContentStatus, InMemorySource};
pub use crate::source::{AutomationTrigger, BlogStore, ContentSource, PublishOutcome, Publisher};
pub use crate::CadenceError;
pub use crate::ContentScheduler;
