// for error definitions
use redis;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LimiterError {
    /// Errors related to the record store
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    RedisAuth(String),

    /// Redis command errors
    #[error("Redis command error: {0}")]
    RedisCommand(String),

    /// Record serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),

    /// In-memory store is full
    #[error("Store capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<StorageError> for LimiterError {
    fn from(err: StorageError) -> Self {
        LimiterError::Storage(err)
    }
}

// Implement conversions from redis::RedisError to StorageError
impl From<redis::RedisError> for LimiterError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                LimiterError::Storage(StorageError::RedisAuth(err.to_string()))
            }
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                // Connection-related errors
                LimiterError::Storage(StorageError::RedisConnection(err.to_string()))
            }
            _ => LimiterError::Storage(StorageError::RedisCommand(err.to_string())),
        }
    }
}

impl From<serde_json::Error> for LimiterError {
    fn from(err: serde_json::Error) -> Self {
        LimiterError::Storage(StorageError::Serialization(err.to_string()))
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, LimiterError>;
