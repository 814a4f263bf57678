use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_serde;

/// Delay schedule between conflicting conditional writes.
///
/// Only the spacing is configurable; the number of attempts is fixed by the updater.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(with = "duration_serde")]
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
    /// Multiplier applied per retry
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in [0.5, 1.0)
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(2),
            max_backoff: Duration::from_millis(25),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// No delay at all between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }
}

/// Exponential backoff over a fixed number of retries
#[derive(Debug)]
pub struct ExponentialBackoff {
    retries_taken: usize,
    max_retries: usize,
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig, max_retries: usize) -> Self {
        Self {
            retries_taken: 0,
            max_retries,
            config,
        }
    }

    /// Delay before the next retry, or None once `max_retries` delays were handed out
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_taken >= self.max_retries {
            return None;
        }
        let exp = self.retries_taken as i32;
        self.retries_taken += 1;

        let base_us = self.config.initial_backoff.as_micros() as f64;
        let max_us = self.config.max_backoff.as_micros() as f64;
        let capped_us = (base_us * self.config.backoff_multiplier.powi(exp)).min(max_us);

        let delay_us = if self.config.use_jitter && capped_us > 0.0 {
            capped_us * rand::rng().random_range(0.5..1.0)
        } else {
            capped_us
        };

        Some(Duration::from_micros(delay_us as u64))
    }

    pub fn reset(&mut self) {
        self.retries_taken = 0;
    }
}
