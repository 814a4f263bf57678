// src/test_utils.rs

use super::error::{LimiterError, Result, StorageError};
use super::storage::{RecordStore, VersionStamp, Versioned, WriteOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process record store that counts calls and can be told to misbehave.
///
/// Clones share the same data and counters. TTLs are recorded but never enforced.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    data: Arc<Mutex<HashMap<String, (Vec<u8>, VersionStamp)>>>,
    gets: Arc<Mutex<HashMap<String, usize>>>,
    sets: Arc<Mutex<HashMap<String, usize>>>,
    ttls: Arc<Mutex<Vec<(String, Duration)>>>,
    total_sets: Arc<AtomicUsize>,
    conflict_always: Arc<AtomicBool>,
    conflicts_pending: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every conditional write reports a conflict
    pub fn always_conflicting() -> Self {
        let store = Self::new();
        store.set_conflict_always(true);
        store
    }

    /// Every call returns a connection error
    pub fn failing() -> Self {
        let store = Self::new();
        store.set_failing(true);
        store
    }

    pub fn set_conflict_always(&self, on: bool) {
        self.conflict_always.store(on, Ordering::SeqCst);
    }

    /// The next `n` conditional writes report a conflict
    pub fn conflict_next(&self, n: usize) {
        self.conflicts_pending.store(n, Ordering::SeqCst);
    }

    pub fn set_failing(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }

    pub fn get_count(&self, key: &str) -> usize {
        self.gets.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Conditional writes attempted on `key`, including conflicting ones
    pub fn set_count(&self, key: &str) -> usize {
        self.sets.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_sets(&self) -> usize {
        self.total_sets.load(Ordering::SeqCst)
    }

    pub fn recorded_ttls(&self) -> Vec<(String, Duration)> {
        self.ttls.lock().unwrap().clone()
    }

    /// Stores raw bytes under `key` as if another writer had put them there
    pub fn seed(&self, key: &str, value: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_vec(), VersionStamp::generate()));
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).map(|(v, _)| v.clone())
    }

    fn check_failing(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LimiterError::Storage(StorageError::RedisConnection(
                "mock store is down".to_string(),
            )));
        }
        Ok(())
    }
}

fn bump(counts: &Mutex<HashMap<String, usize>>, key: &str) {
    *counts.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
}

#[async_trait]
impl RecordStore for MockStore {
    type Config = ();

    async fn new(_config: Self::Config) -> Result<Self> {
        Ok(Self::new())
    }

    async fn get(&self, key: &str) -> Result<Versioned> {
        bump(&self.gets, key);
        self.check_failing()?;

        let data = self.data.lock().unwrap();
        Ok(match data.get(key) {
            Some((value, stamp)) => Versioned {
                value: Some(value.clone()),
                stamp: Some(stamp.clone()),
            },
            None => Versioned::absent(),
        })
    }

    async fn conditional_set(
        &self,
        key: &str,
        value: &[u8],
        expected: Option<&VersionStamp>,
        ttl: Duration,
    ) -> Result<WriteOutcome> {
        bump(&self.sets, key);
        self.total_sets.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.ttls.lock().unwrap().push((key.to_string(), ttl));

        if self.conflict_always.load(Ordering::SeqCst) {
            return Ok(WriteOutcome::Conflict);
        }
        if self
            .conflicts_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(WriteOutcome::Conflict);
        }

        let mut data = self.data.lock().unwrap();
        let current = data.get(key).map(|(_, stamp)| stamp);
        if current != expected {
            return Ok(WriteOutcome::Conflict);
        }

        let stamp = VersionStamp::generate();
        data.insert(key.to_string(), (value.to_vec(), stamp.clone()));
        Ok(WriteOutcome::Applied(stamp))
    }
}
