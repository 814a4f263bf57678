//! The persisted rate limit record and the keys it lives under.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::Result;

/// Dimension a record is partitioned by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Ip,
    Session,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Ip => "ip",
            Scope::Session => "session",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified store key of one record.
///
/// `<prefix>:ip:<ip>` or `<prefix>:session:<session id>:<identifier>`. Session parts are
/// caller supplied, so `%` and `:` inside them are percent-encoded to keep distinct pairs
/// on distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    scope: Scope,
    rendered: String,
}

impl RecordKey {
    pub fn ip(prefix: &str, ip: &str) -> Self {
        Self {
            scope: Scope::Ip,
            rendered: format!("{}:{}:{}", prefix, Scope::Ip, ip),
        }
    }

    pub fn session(prefix: &str, session_id: &str, identifier: &str) -> Self {
        Self {
            scope: Scope::Session,
            rendered: format!(
                "{}:{}:{}:{}",
                prefix,
                Scope::Session,
                escape(session_id),
                escape(identifier)
            ),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

fn escape(part: &str) -> Cow<'_, str> {
    if !part.contains(['%', ':']) {
        return Cow::Borrowed(part);
    }
    Cow::Owned(part.replace('%', "%25").replace(':', "%3A"))
}

/// Accepted request timestamps (epoch ms), oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitRecord {
    timestamps: Vec<i64>,
}

impl RateLimitRecord {
    pub fn new(timestamps: Vec<i64>) -> Self {
        Self { timestamps }
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn into_timestamps(self) -> Vec<i64> {
        self.timestamps
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
