//! Content scheduling with retries.
//!
//! Cadence periodically collects content that is due for publishing from one
//! [`source::ContentSource`] per [`item::ContentKind`], queues it, and hands each item to the
//! matching [`source::Publisher`] under a concurrency cap. Failed publishes are retried with
//! exponential backoff. Items that stay in processing for too long are reset so a crashed or
//! hung publish never wedges the queue.
//!
//! The main entry point is [`ContentScheduler`]. Blog posts, which carry their own schedule and
//! post-publish automation, are handled by [`blog::BlogPostScheduler`], either on its own or
//! composed into a `ContentScheduler`. Both record what they do in a shared
//! [`logger::SchedulerLogger`].
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use cadence::prelude::*;
//! use cadence::testing::ScriptedPublisher;
//!
//! let scheduler = ContentScheduler::builder(SchedulerConfig::default())
//!     .with_channel(ContentKind::Newsletter, InMemorySource::new(), ScriptedPublisher::new())
//!     .build()
//!     .unwrap();
//!
//! scheduler.start();
//! let report = scheduler.stop().await;
//!
//! assert!(!report.forced);
//! # });
//! ```
pub mod backoff;
pub mod blog;
pub mod clock;
pub mod config;
pub mod global;
pub mod item;
pub mod logger;
pub mod prelude;
pub mod queue;
pub mod scheduler;
pub mod source;
pub mod testing;

pub use scheduler::ContentScheduler;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("The global scheduler has already been set, or has not been set yet")]
    GlobalScheduler,
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Logger(#[from] logger::LoggerError),
    #[error(transparent)]
    Source(#[from] source::SourceError),
    #[error(transparent)]
    Blog(#[from] blog::BlogSchedulerError),
}
