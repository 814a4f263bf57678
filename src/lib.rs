// library entry
pub mod algorithms;
pub mod client_ip;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod record;
pub mod resilience;
pub mod response;
pub mod storage;
pub mod updater;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod tests;

// Re-export key components for convenience
pub use algorithms::DenyReason;
pub use config::{AdmissionConfig, LimiterConfig};
pub use error::{LimiterError, Result};
pub use limiter::{Allowance, Denial, RateLimiter, SessionScope, Verdict};
pub use logging::init as init_logging;
pub use record::Scope;
pub use response::{CachePolicy, ErrorCode, Rejection};
pub use storage::{MemoryStorage, RecordStore, RedisStorage};
pub use updater::{AdmissionResult, DegradedCause};
