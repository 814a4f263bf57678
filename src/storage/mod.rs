// src/storage/mod.rs

pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use memory::MemoryStorage;
pub use redis::RedisStorage;

use super::error::Result;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::time::Duration;

/// Opaque token identifying one write of a key.
///
/// Assigned by the store on every successful write and compared on the next conditional
/// write. Callers never construct or interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionStamp(String);

impl VersionStamp {
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value together with the stamp of the write that produced it.
///
/// An absent key reads as `value: None, stamp: None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versioned {
    pub value: Option<Vec<u8>>,
    pub stamp: Option<VersionStamp>,
}

impl Versioned {
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Value stored under the new stamp
    Applied(VersionStamp),
    /// Key was written by someone else since it was read
    Conflict,
}

/// Shared key/value store with TTLs and compare-and-swap on a version stamp.
///
/// This is the only coordination point between limiter instances, so implementations must
/// make `conditional_set` atomic with respect to every other writer of the key.
#[async_trait]
pub trait RecordStore: Send + Sync + Debug {
    // The type of configuration this store accepts
    type Config: Send + Sync;

    // Creates a new instance of this store with the given configuration
    async fn new(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Reads a value and the stamp of its last write
    async fn get(&self, key: &str) -> Result<Versioned>;

    /// Writes `value` with `ttl` only if the key's current stamp equals `expected`
    /// (`None` meaning the key must be absent).
    async fn conditional_set(
        &self,
        key: &str,
        value: &[u8],
        expected: Option<&VersionStamp>,
        ttl: Duration,
    ) -> Result<WriteOutcome>;
}
