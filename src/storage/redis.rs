// src/storage/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RedisConfig;
use crate::error::{LimiterError, Result, StorageError};
use crate::storage::{RecordStore, VersionStamp, Versioned, WriteOutcome};
use crate::storage_op;

// Records are hashes: `ver` holds the stamp, `data` the encoded value.
//
// KEYS[1] record key
// ARGV[1] expected stamp, "" when the key must be absent
// ARGV[2] new stamp
// ARGV[3] value
// ARGV[4] ttl in milliseconds
const CONDITIONAL_SET: &str = r#"
local current = redis.call('HGET', KEYS[1], 'ver')
if current == false then
    current = ''
end
if current ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'ver', ARGV[2], 'data', ARGV[3])
redis.call('PEXPIRE', KEYS[1], ARGV[4])
return 1
"#;

/// Redis-backed record store shared by every limiter instance.
///
/// One `ConnectionManager` is opened at startup and reused; the manager reconnects on its own.
pub struct RedisStorage {
    connection: Arc<tokio::sync::Mutex<ConnectionManager>>,
    conditional_set: Arc<Script>,
    config: RedisConfig,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("url", &self.config.url)
            .finish()
    }
}

impl Clone for RedisStorage {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            conditional_set: Arc::clone(&self.conditional_set),
            config: self.config.clone(),
        }
    }
}

impl RedisStorage {
    /// Connects to Redis, failing if the connection is not up within `connection_timeout`
    pub async fn new(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str())
            .map_err(|e| StorageError::RedisConnection(e.to_string()))?;

        let connection_future = ConnectionManager::new(client);

        let connection_manager =
            match tokio::time::timeout(config.connection_timeout, connection_future).await {
                Ok(result) => result.map_err(LimiterError::from)?,
                Err(_) => {
                    return Err(StorageError::RedisConnection(format!(
                        "Connection to Redis at {} timed out after {:?}",
                        config.url, config.connection_timeout
                    ))
                    .into());
                }
            };

        Ok(Self {
            connection: Arc::new(tokio::sync::Mutex::new(connection_manager)),
            conditional_set: Arc::new(Script::new(CONDITIONAL_SET)),
            config,
        })
    }

    /// Ping Redis to check health with timeout
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let ping_future = redis::AsyncCommands::ping::<String>(&mut *conn);

        let result = match tokio::time::timeout(self.config.connection_timeout, ping_future).await
        {
            Ok(inner) => inner.map_err(LimiterError::from)?,
            Err(_) => {
                return Err(StorageError::RedisCommand(format!(
                    "Redis PING timed out after {:?}",
                    self.config.connection_timeout
                ))
                .into());
            }
        };

        if result == "PONG" {
            Ok(())
        } else {
            Err(StorageError::RedisCommand(format!(
                "Unexpected response from Redis PING: {}",
                result
            ))
            .into())
        }
    }
}

#[async_trait]
impl RecordStore for RedisStorage {
    type Config = RedisConfig;

    async fn new(config: Self::Config) -> Result<Self> {
        Self::new(config).await
    }

    async fn get(&self, key: &str) -> Result<Versioned> {
        let started = Instant::now();
        let mut conn = self.connection.lock().await;

        let result: redis::RedisResult<(Option<String>, Option<Vec<u8>>)> = redis::cmd("HMGET")
            .arg(key)
            .arg("ver")
            .arg("data")
            .query_async(&mut *conn)
            .await;
        storage_op!("get", key, result, started.elapsed().as_millis() as u64);

        let (stamp, value) = result?;
        match (stamp, value) {
            (Some(stamp), Some(value)) => Ok(Versioned {
                value: Some(value),
                stamp: Some(VersionStamp::from_raw(stamp)),
            }),
            // stamped but empty; keep the stamp so the next write still conflicts correctly
            (Some(stamp), None) => Ok(Versioned {
                value: None,
                stamp: Some(VersionStamp::from_raw(stamp)),
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
        let started = Instant::now();
        let stamp = VersionStamp::generate();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let mut conn = self.connection.lock().await;

        let result: redis::RedisResult<i64> = self
            .conditional_set
            .key(key)
            .arg(expected.map(VersionStamp::as_str).unwrap_or(""))
            .arg(stamp.as_str())
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut *conn)
            .await;
        storage_op!(
            "conditional_set",
            key,
            result,
            started.elapsed().as_millis() as u64
        );

        match result? {
            1 => Ok(WriteOutcome::Applied(stamp)),
            _ => Ok(WriteOutcome::Conflict),
        }
    }
}
