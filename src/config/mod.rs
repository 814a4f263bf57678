// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LimiterError, Result};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Length of the trailing burst window, fixed for every limiter.
pub const BURST_WINDOW: Duration = Duration::from_millis(10_000);

/// Sliding window limits for one class of endpoint.
///
/// Immutable once built; every constructor path goes through [`LimiterConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLimiterConfig", into = "RawLimiterConfig")]
pub struct LimiterConfig {
    window: Duration,
    max_requests: u32,
    burst: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLimiterConfig {
    window_ms: u64,
    max_requests: u32,
    burst: u32,
}

impl LimiterConfig {
    /// Generous per-IP default for public API routes.
    pub const PUBLIC_API: LimiterConfig = LimiterConfig {
        window: Duration::from_millis(60_000),
        max_requests: 60,
        burst: 10,
    };

    /// One tracked event per window (view/click tracking).
    pub const ANALYTICS: LimiterConfig = LimiterConfig {
        window: Duration::from_millis(300_000),
        max_requests: 1,
        burst: 1,
    };

    /// Account creation.
    pub const SIGNUP: LimiterConfig = LimiterConfig {
        window: Duration::from_millis(60_000),
        max_requests: 3,
        burst: 1,
    };

    /// Builds a validated config.
    ///
    /// The window must be at least one millisecond, `max_requests` and `burst` must be
    /// positive, and `burst` may not exceed `max_requests`.
    pub fn new(window: Duration, max_requests: u32, burst: u32) -> Result<Self> {
        if window.as_millis() == 0 {
            return Err(LimiterError::Config(
                "window must be at least 1ms".to_string(),
            ));
        }
        if i64::try_from(window.as_millis()).is_err() {
            return Err(LimiterError::Config(format!(
                "window of {:?} is too large",
                window
            )));
        }
        if max_requests == 0 {
            return Err(LimiterError::Config(
                "max_requests must be positive".to_string(),
            ));
        }
        if burst == 0 {
            return Err(LimiterError::Config("burst must be positive".to_string()));
        }
        if burst > max_requests {
            return Err(LimiterError::Config(format!(
                "burst ({}) exceeds max_requests ({}); the burst limit would never apply",
                burst, max_requests
            )));
        }

        Ok(Self {
            window,
            max_requests,
            burst,
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_ms(&self) -> i64 {
        // bounded by the check in `new` and by the presets
        self.window.as_millis() as i64
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Looks up a preset by its CLI name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "public_api" => Some(Self::PUBLIC_API),
            "analytics" => Some(Self::ANALYTICS),
            "signup" => Some(Self::SIGNUP),
            _ => None,
        }
    }
}

impl TryFrom<RawLimiterConfig> for LimiterConfig {
    type Error = LimiterError;

    fn try_from(raw: RawLimiterConfig) -> Result<Self> {
        LimiterConfig::new(
            Duration::from_millis(raw.window_ms),
            raw.max_requests,
            raw.burst,
        )
    }
}

impl From<LimiterConfig> for RawLimiterConfig {
    fn from(config: LimiterConfig) -> Self {
        Self {
            window_ms: config.window.as_millis() as u64,
            max_requests: config.max_requests,
            burst: config.burst,
        }
    }
}

impl FromStr for LimiterConfig {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self> {
        LimiterConfig::preset(s).ok_or_else(|| {
            LimiterError::Config(format!(
                "unknown preset '{}', expected one of public_api, analytics, signup",
                s
            ))
        })
    }
}

impl fmt::Display for LimiterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} req / {}ms (burst {} / {}ms)",
            self.max_requests,
            self.window.as_millis(),
            self.burst,
            BURST_WINDOW.as_millis()
        )
    }
}

/// Configuration for Redis storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout: default_conn_timeout(),
        }
    }
}

/// Configuration for in-memory storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Maximum number of records to store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Whether to use a background task for expiration
    #[serde(default = "default_use_background_task")]
    pub use_background_task: bool,

    /// How often to run the background expiration task
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            use_background_task: default_use_background_task(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_max_entries() -> usize {
    10_000
}

fn default_use_background_task() -> bool {
    true
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

/// Top-level configuration of the admission layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Key prefix to use for all records in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Headers consulted, in order, for the client address
    #[serde(default = "default_client_ip_headers")]
    pub client_ip_headers: Vec<String>,

    /// Delay between conflicting conditional writes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Store failure tracking
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Shared store; when absent the in-memory store is used
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    #[serde(default)]
    pub memory: InMemoryConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            client_ip_headers: default_client_ip_headers(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            redis: None,
            memory: InMemoryConfig::default(),
        }
    }
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_client_ip_headers() -> Vec<String> {
    vec![
        "x-forwarded-for".to_string(),
        "x-real-ip".to_string(),
        "cf-connecting-ip".to_string(),
    ]
}

impl AdmissionConfig {
    /// Loads `.env` (if present) and overlays the `ADMISSION_*` variables on the defaults.
    ///
    /// - `ADMISSION_KEY_PREFIX`
    /// - `ADMISSION_REDIS_URL`
    /// - `ADMISSION_CLIENT_IP_HEADERS` (comma separated)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: AdmissionConfig = serde_json::from_str(raw)
            .map_err(|e| LimiterError::Config(format!("invalid admission config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AdmissionConfig::default();

        if let Some(prefix) = lookup("ADMISSION_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(url) = lookup("ADMISSION_REDIS_URL") {
            config.redis = Some(RedisConfig::new(url));
        }
        if let Some(headers) = lookup("ADMISSION_CLIENT_IP_HEADERS") {
            config.client_ip_headers = headers
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(LimiterError::Config("key_prefix is empty".to_string()));
        }
        for name in &self.client_ip_headers {
            http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                LimiterError::Config(format!("invalid client ip header name '{}'", name))
            })?;
        }
        Ok(())
    }
}

// Helper module to serialize/deserialize Duration with serde
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
