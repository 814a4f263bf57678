// src/resilience/mod.rs
//! Store-facing resilience for the admission path.
//!
//! 1. **Retry spacing** - jittered exponential delay between conflicting conditional writes
//! 2. **Circuit breaking** - stop calling a failing store and fail open immediately

mod circuit_breaker;
mod exponential_backoff;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use exponential_backoff::{ExponentialBackoff, RetryConfig};
