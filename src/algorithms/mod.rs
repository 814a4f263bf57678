// src/algorithms/mod.rs

pub mod sliding_window;

#[cfg(test)]
mod tests;

pub use sliding_window::evaluate;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::RateLimitRecord;

/// Which ceiling a denied request hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// `max_requests` reached inside the sliding window
    WindowExceeded,
    /// `burst` reached inside the trailing burst window
    BurstExceeded,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::WindowExceeded => "WINDOW_EXCEEDED",
            DenyReason::BurstExceeded => "BURST_EXCEEDED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one record against a limiter config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowDecision {
    /// Admit; `next` is the record to persist (expired entries dropped, `now` appended)
    Allow {
        next: RateLimitRecord,
        remaining: u32,
    },
    /// Reject; retry no sooner than `retry_after_secs`
    Deny {
        reason: DenyReason,
        retry_after_secs: u64,
    },
}

impl WindowDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, WindowDecision::Allow { .. })
    }
}
