// src/storage/memory.rs

// Single-process record store for tests and local tooling. Same compare-and-swap
// semantics as the shared store; not shared across instances.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::debug;

use crate::config::InMemoryConfig;
use crate::error::{Result, StorageError};
use crate::storage::{RecordStore, VersionStamp, Versioned, WriteOutcome};

#[derive(Debug)]
struct MemoryEntry {
    value: Vec<u8>,
    stamp: VersionStamp,
    expiry: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expiry > now
    }
}

type Entries = RwLock<HashMap<String, MemoryEntry>>;

/// In-memory record store
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Arc<Entries>,
    config: InMemoryConfig,
}

impl MemoryStorage {
    /// Creates a new in-memory store.
    ///
    /// With `use_background_task` a sweeper runs on the current tokio runtime until the last
    /// clone of the store is dropped; without a runtime the sweeper is skipped and expired
    /// entries are only dropped lazily.
    pub fn new(config: InMemoryConfig) -> Self {
        let data = Arc::new(RwLock::new(HashMap::with_capacity(
            config.max_entries.min(10_000),
        )));

        if config.use_background_task {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let weak = Arc::downgrade(&data);
                handle.spawn(Self::sweep(weak, config.cleanup_interval));
            }
        }

        Self { data, config }
    }

    async fn sweep(data: Weak<Entries>, every: Duration) {
        let mut interval = time::interval(every.max(Duration::from_millis(10)));
        loop {
            interval.tick().await;
            let Some(data) = data.upgrade() else {
                break;
            };
            let removed = Self::cleanup_expired_entries(&data);
            if removed > 0 {
                debug!(removed, "Swept expired records");
            }
        }
    }

    /// Removes expired entries, returning how many were dropped
    fn cleanup_expired_entries(data: &Entries) -> usize {
        let now = Instant::now();
        let Ok(mut data) = data.write() else {
            return 0;
        };
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now));
        before - data.len()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .map(|data| data.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // live or not
    #[cfg(test)]
    pub(crate) fn stored_entries(&self) -> usize {
        self.data.read().map(|data| data.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for MemoryStorage {
    type Config = InMemoryConfig;

    async fn new(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config))
    }

    async fn get(&self, key: &str) -> Result<Versioned> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;

        match data.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Versioned {
                value: Some(entry.value.clone()),
                stamp: Some(entry.stamp.clone()),
            }),
            _ => Ok(Versioned::absent()),
        }
    }

    async fn conditional_set(
        &self,
        key: &str,
        value: &[u8],
        expected: Option<&VersionStamp>,
        ttl: Duration,
    ) -> Result<WriteOutcome> {
        let now = Instant::now();
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;

        let current = data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| &entry.stamp);

        if current != expected {
            return Ok(WriteOutcome::Conflict);
        }

        if !data.contains_key(key) && data.len() >= self.config.max_entries {
            data.retain(|_, entry| entry.is_live(now));
            if data.len() >= self.config.max_entries {
                return Err(StorageError::CapacityExceeded(format!(
                    "{} records",
                    self.config.max_entries
                ))
                .into());
            }
        }

        let stamp = VersionStamp::generate();
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                stamp: stamp.clone(),
                expiry: now + ttl,
            },
        );

        Ok(WriteOutcome::Applied(stamp))
    }
}
