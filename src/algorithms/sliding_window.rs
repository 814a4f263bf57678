// src/algorithms/sliding_window.rs

use crate::algorithms::{DenyReason, WindowDecision};
use crate::config::{LimiterConfig, BURST_WINDOW};
use crate::record::RateLimitRecord;

/// Sliding log evaluation of one record.
///
/// Unlike a bucketed sliding window this keeps every accepted timestamp, so the count is
/// exact: a request admitted at `t0` stops counting at `t0 + window + 1ms`. A second, fixed
/// 10 second window on the same log caps how many of the allowed requests may arrive
/// back to back.
///
/// Pure: the same inputs always give the same decision, and nothing is written. The caller
/// persists `next` on `Allow`.
pub fn evaluate(timestamps: &[i64], now_ms: i64, config: &LimiterConfig) -> WindowDecision {
    let window_ms = config.window_ms();
    let window_start = now_ms.saturating_sub(window_ms);

    // strictly newer than the window start
    let valid: Vec<i64> = timestamps
        .iter()
        .copied()
        .filter(|&ts| ts > window_start)
        .collect();

    if valid.len() >= config.max_requests() as usize {
        // oldest in-window entry decides when a slot frees up
        let oldest = valid.first().copied().unwrap_or(now_ms);
        // saturating: a skewed writer can leave timestamps far in the future
        let wait_ms = oldest
            .saturating_add(window_ms)
            .saturating_sub(now_ms)
            .max(0);
        return WindowDecision::Deny {
            reason: DenyReason::WindowExceeded,
            retry_after_secs: ceil_secs(wait_ms),
        };
    }

    let burst_start = now_ms.saturating_sub(BURST_WINDOW.as_millis() as i64);
    let recent = valid.iter().filter(|&&ts| ts > burst_start).count();

    if recent >= config.burst() as usize {
        return WindowDecision::Deny {
            reason: DenyReason::BurstExceeded,
            retry_after_secs: BURST_WINDOW.as_secs(),
        };
    }

    let mut next = valid;
    next.push(now_ms);
    let remaining = config.max_requests().saturating_sub(next.len() as u32);

    WindowDecision::Allow {
        next: RateLimitRecord::new(next),
        remaining,
    }
}

fn ceil_secs(ms: i64) -> u64 {
    (ms.saturating_add(999) / 1_000) as u64
}
