//! Retry policy for failed state invocations
//!
//! Every [`ProcessToken`](crate::ProcessToken) carries a retry budget
//! (default 3) and a retry counter. The scheduler only consults them when the
//! engine's [`RetryPolicy`] is enabled; otherwise a failed invocation fails
//! the run immediately.
//!
//! When enabled, a failed invocation is re-attempted in place, inside the
//! same round, while every token involved can still retry. The wait between
//! attempts uses exponential backoff:
//!
//! ```text
//! delay = initial_interval × backoff_factor ^ attempt
//! delay = min(delay, max_interval)
//! if jitter: delay ×= random(0.5..=1.5)
//! ```
//!
//! # Example
//!
//! ```rust
//! use tickgraph_core::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::enabled()
//!     .with_initial_interval(0.1)
//!     .with_backoff_factor(2.0)
//!     .with_max_interval(1.0)
//!     .with_jitter(false);
//!
//! assert_eq!(policy.calculate_delay(0), Duration::from_secs_f64(0.1));
//! assert_eq!(policy.calculate_delay(1), Duration::from_secs_f64(0.2));
//! assert_eq!(policy.calculate_delay(10), Duration::from_secs_f64(1.0));
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration for token retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Whether the scheduler retries failed tokens at all
    pub enabled: bool,

    /// Initial interval between retries in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each retry
    pub backoff_factor: f64,

    /// Maximum interval between retries in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to intervals
    pub jitter: bool,
}

impl RetryPolicy {
    /// A disabled policy: failures propagate immediately
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: true,
        }
    }

    /// An enabled policy with the default backoff
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::disabled()
        }
    }

    /// Set the initial interval between retries
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum interval between retries
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay before retry number `attempt` (0-indexed)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let base_delay = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_interval).max(0.0);

        let final_delay = if self.jitter {
            let mut rng = rand::thread_rng();
            capped_delay * rng.gen_range(0.5..=1.5)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}
