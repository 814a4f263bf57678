// src/response.rs

use chrono::{DateTime, TimeDelta, Utc};
use http::header::{
    HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA, RETRY_AFTER, VARY,
};
use http::{HeaderMap, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::algorithms::DenyReason;
use crate::error::{LimiterError, Result};
use crate::limiter::{Allowance, Denial, Verdict};
use crate::record::Scope;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Machine-readable class of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimitExceeded,
    SessionLimitExceeded,
}

impl ErrorCode {
    pub fn for_scope(scope: Scope) -> Self {
        match scope {
            Scope::Ip => ErrorCode::RateLimitExceeded,
            Scope::Session => ErrorCode::SessionLimitExceeded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::SessionLimitExceeded => "SESSION_LIMIT_EXCEEDED",
        }
    }
}

/// JSON body of a 429
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub error: String,
    pub code: ErrorCode,
    pub retry_after: u64,
}

/// A denial rendered for the HTTP boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: &'static str,
    pub retry_after_secs: u64,
    pub limit: u32,
    pub reset_at_ms: i64,
}

impl Rejection {
    pub fn from_denial(denial: &Denial) -> Self {
        Self {
            code: ErrorCode::for_scope(denial.scope),
            message: message_for(denial.scope, denial.reason),
            retry_after_secs: denial.retry_after_secs,
            limit: denial.limit,
            reset_at_ms: denial.reset_at_ms,
        }
    }

    pub fn body(&self) -> RejectionBody {
        RejectionBody {
            error: self.message.to_string(),
            code: self.code,
            retry_after: self.retry_after_secs,
        }
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at_ms));
        headers
    }

    /// 429 with the JSON body and rate limit headers
    pub fn into_response(self) -> Result<Response<String>> {
        let body = serde_json::to_string(&self.body())?;

        let mut response = Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .map_err(|e| LimiterError::Internal(format!("failed to build 429: {}", e)))?;

        response.headers_mut().extend(self.headers());
        Ok(response)
    }
}

fn message_for(scope: Scope, reason: DenyReason) -> &'static str {
    match (scope, reason) {
        (Scope::Ip, DenyReason::WindowExceeded) => "Too many requests. Please try again later.",
        (Scope::Ip, DenyReason::BurstExceeded) => {
            "Too many requests in a short period. Please slow down."
        }
        (Scope::Session, DenyReason::WindowExceeded) => {
            "Too many requests for this session. Please try again later."
        }
        (Scope::Session, DenyReason::BurstExceeded) => {
            "Too many requests for this session in a short period. Please slow down."
        }
    }
}

impl Verdict {
    /// The boundary rejection, or None when the request should continue
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Verdict::Allowed(_) => None,
            Verdict::Denied(denial) => Some(Rejection::from_denial(denial)),
        }
    }
}

impl Allowance {
    /// Adds `X-RateLimit-Limit` / `X-RateLimit-Remaining` to a successful response
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
    }
}

/// Caching headers for a successful response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Shared caches may keep the response for `ttl`
    Public { ttl: Duration },
    /// Nothing may cache the response
    NoStore,
}

impl CachePolicy {
    pub fn apply(&self, headers: &mut HeaderMap, now: DateTime<Utc>) -> Result<()> {
        match self {
            CachePolicy::Public { ttl } => {
                let secs = ttl.as_secs();
                headers.insert(
                    CACHE_CONTROL,
                    header_value(format!("public, max-age={0}, s-maxage={0}", secs))?,
                );

                let expires = i64::try_from(secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or_else(|| {
                        LimiterError::Config(format!("cache ttl out of range: {}s", secs))
                    })?;
                headers.insert(EXPIRES, header_value(expires.format(HTTP_DATE).to_string())?);
                headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
            }
            CachePolicy::NoStore => {
                headers.insert(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
                );
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(EXPIRES, HeaderValue::from_static("0"));
            }
        }
        Ok(())
    }

    /// Applies the policy to `response` as of the current wall time
    pub fn decorate<B>(&self, response: &mut Response<B>) -> Result<()> {
        self.apply(response.headers_mut(), Utc::now())
    }
}

fn header_value(raw: String) -> Result<HeaderValue> {
    HeaderValue::try_from(raw)
        .map_err(|e| LimiterError::Internal(format!("invalid header value: {}", e)))
}
