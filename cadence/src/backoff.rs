//! Backoff strategies for retrying failed publishes.
//!
//! The scheduler queues use an exponential strategy built from [`crate::config::RetryConfig`]:
//! the delay before retry `n` (counting from 1) is `base * multiplier^(n - 1)`, optionally
//! clamped to a maximum and perturbed by a [`Jitter`].
//!
//! All of the constructors and configuration functions are `const`.
//!
//! # Example
//!
//! ```
//! # use cadence::prelude::*;
//! # use chrono::TimeDelta;
//! let strategy = BackoffStrategy::exponential(TimeDelta::seconds(1), 2.0)
//!     .with_max(TimeDelta::seconds(5));
//!
//! assert_eq!(strategy.backoff(1), TimeDelta::seconds(1));
//! assert_eq!(strategy.backoff(2), TimeDelta::seconds(2));
//! assert_eq!(strategy.backoff(3), TimeDelta::seconds(4));
//! assert_eq!(strategy.backoff(4), TimeDelta::seconds(5));
//! ```

use chrono::TimeDelta;
use rand::Rng;

/// Type that can be used to implement a backoff strategy.
pub trait Strategy {
    /// Given the number of failures so far returns the [`TimeDelta`] to wait before the item
    /// should be retried.
    fn backoff(&self, attempt: u32) -> TimeDelta;
}

/// Exponential backoff strategy.
///
/// Starts at `base` for the first retry and multiplies by `multiplier` for every subsequent one.
///
/// __Note:__ This type cannot be constructed directly, instead [`BackoffStrategy::exponential`]
/// should be used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    base: TimeDelta,
    multiplier: f64,
    max: Option<TimeDelta>,
}

impl Strategy for Exponential {
    fn backoff(&self, attempt: u32) -> TimeDelta {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let milliseconds = self.base.num_milliseconds() as f64 * factor;
        let mut backoff = if milliseconds.is_finite() && milliseconds < i64::MAX as f64 {
            TimeDelta::milliseconds(milliseconds.round() as i64)
        } else {
            TimeDelta::MAX
        };
        if let Some(max) = self.max {
            backoff = backoff.min(max);
        }
        backoff
    }
}

/// A random jitter to be applied to a given backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// A random jitter to be added to the backoff in the range `-delta =< jitter =< delta`.
    Absolute(TimeDelta),
    /// A random jitter to be added as a proportion of the current backoff.
    Relative(f64),
}

impl Jitter {
    fn apply_jitter(&self, value: TimeDelta) -> TimeDelta {
        let milliseconds = match self {
            Self::Absolute(delta) => delta.num_milliseconds(),
            Self::Relative(ratio) => (value.num_milliseconds() as f64 * ratio).round() as i64,
        }
        .abs();
        if milliseconds == 0 {
            return value;
        }
        let rand_jitter = rand::thread_rng().gen_range(-milliseconds..=milliseconds);
        value
            .checked_add(&TimeDelta::milliseconds(rand_jitter))
            .unwrap_or(value)
    }
}

/// A backoff strategy with optional jitter and a lower bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStrategy<T: Strategy> {
    strategy: T,
    jitter: Option<Jitter>,
    min: TimeDelta,
}

impl BackoffStrategy<Exponential> {
    /// Creates a [`BackoffStrategy`] with an exponential backoff strategy.
    ///
    /// It is advisable to set the maximum backoff using [`BackoffStrategy::with_max`].
    pub const fn exponential(base: TimeDelta, multiplier: f64) -> Self {
        Self::new(Exponential {
            base,
            multiplier,
            max: None,
        })
    }

    /// Clamps the maximum value to be returned by [`Strategy::backoff`] to `max_delay`.
    pub const fn with_max(mut self, max_delay: TimeDelta) -> Self {
        self.strategy.max = Some(max_delay);
        self
    }
}

impl<T> BackoffStrategy<T>
where
    T: Strategy,
{
    pub const fn new(strategy: T) -> Self {
        Self {
            strategy,
            jitter: None,
            min: TimeDelta::zero(),
        }
    }

    /// Add a jitter to the backoff strategy see [`Jitter`] for more information about how this
    /// affects the strategy.
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Add a minimum value. Useful with a large jitter to avoid retrying almost immediately.
    pub const fn with_min(mut self, min: TimeDelta) -> Self {
        self.min = min;
        self
    }
}

impl<T> Strategy for BackoffStrategy<T>
where
    T: Strategy,
{
    fn backoff(&self, attempt: u32) -> TimeDelta {
        let mut backoff = self.strategy.backoff(attempt);

        if let Some(jitter) = self.jitter {
            backoff = jitter.apply_jitter(backoff);
        }

        backoff.max(self.min)
    }
}
