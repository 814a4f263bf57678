// src/limiter.rs

use http::{HeaderMap, Request};
use std::sync::Arc;
use tracing::debug;

use crate::algorithms::DenyReason;
use crate::client_ip::extract_client_ip;
use crate::clock::{Clock, SystemClock};
use crate::config::{AdmissionConfig, LimiterConfig};
use crate::record::{RecordKey, Scope};
use crate::resilience::CircuitBreaker;
use crate::storage::RecordStore;
use crate::updater::{AdmissionResult, DegradedCause, OptimisticUpdater};

/// Second admission dimension: a session acting on one identifier (a board, a form).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionScope {
    session_id: String,
    identifier: String,
}

impl SessionScope {
    /// None unless both parts are non-empty
    pub fn new(session_id: impl Into<String>, identifier: impl Into<String>) -> Option<Self> {
        let session_id = session_id.into();
        let identifier = identifier.into();
        if session_id.is_empty() || identifier.is_empty() {
            return None;
        }
        Some(Self {
            session_id,
            identifier,
        })
    }

    pub fn from_parts(session_id: Option<&str>, identifier: Option<&str>) -> Option<Self> {
        match (session_id, identifier) {
            (Some(session_id), Some(identifier)) => Self::new(session_id, identifier),
            _ => None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Admitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub remaining: u32,
    pub limit: u32,
    pub degraded: Option<DegradedCause>,
}

/// Rejected request and the scope that rejected it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    pub scope: Scope,
    pub reason: DenyReason,
    pub retry_after_secs: u64,
    pub limit: u32,
    pub reset_at_ms: i64,
}

/// Final admission decision for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed(Allowance),
    Denied(Denial),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed(_))
    }

    fn from_scope(scope: Scope, result: AdmissionResult) -> Self {
        match result {
            AdmissionResult::Allowed {
                remaining,
                limit,
                degraded,
            } => Verdict::Allowed(Allowance {
                remaining,
                limit,
                degraded,
            }),
            AdmissionResult::Denied {
                reason,
                retry_after_secs,
                limit,
                reset_at_ms,
            } => Verdict::Denied(Denial {
                scope,
                reason,
                retry_after_secs,
                limit,
                reset_at_ms,
            }),
        }
    }
}

/// Admission gate combining the per-IP and per-session scopes.
///
/// The IP scope is always checked first and a denial there returns before the session
/// record is read or written. Both scopes use the same [`LimiterConfig`] for a route.
#[derive(Debug)]
pub struct RateLimiter<S: RecordStore> {
    updater: OptimisticUpdater<S>,
    key_prefix: String,
    client_ip_headers: Vec<String>,
}

impl<S: RecordStore> RateLimiter<S> {
    pub fn new(store: Arc<S>, config: &AdmissionConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, config: &AdmissionConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let updater = OptimisticUpdater::new(store, clock, config.retry.clone())
            .with_circuit_breaker(breaker);

        Self {
            updater,
            key_prefix: config.key_prefix.clone(),
            client_ip_headers: config.client_ip_headers.clone(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.updater.store()
    }

    /// Client address this limiter would key `headers` under
    pub fn client_ip(&self, headers: &HeaderMap) -> String {
        extract_client_ip(headers, &self.client_ip_headers)
    }

    pub async fn admit(
        &self,
        headers: &HeaderMap,
        config: &LimiterConfig,
        session: Option<&SessionScope>,
    ) -> Verdict {
        let ip = self.client_ip(headers);
        let ip_key = RecordKey::ip(&self.key_prefix, &ip);

        let ip_verdict =
            Verdict::from_scope(Scope::Ip, self.updater.attempt_admission(&ip_key, config).await);

        let Verdict::Allowed(ip_allowance) = ip_verdict else {
            debug!(client_ip = %ip, "Denied by IP scope");
            return ip_verdict;
        };

        let Some(session) = session else {
            return ip_verdict;
        };

        let session_key =
            RecordKey::session(&self.key_prefix, session.session_id(), session.identifier());
        let session_verdict = Verdict::from_scope(
            Scope::Session,
            self.updater.attempt_admission(&session_key, config).await,
        );

        match session_verdict {
            Verdict::Denied(_) => {
                debug!(
                    session_id = session.session_id(),
                    identifier = session.identifier(),
                    "Denied by session scope"
                );
                session_verdict
            }
            Verdict::Allowed(session_allowance) => {
                Verdict::Allowed(merge_allowances(ip_allowance, session_allowance))
            }
        }
    }

    /// [`admit`](Self::admit) reading the client address from the request's headers
    pub async fn admit_request<B>(
        &self,
        request: &Request<B>,
        config: &LimiterConfig,
        session: Option<&SessionScope>,
    ) -> Verdict {
        self.admit(request.headers(), config, session).await
    }
}

// Reports whichever scope is closer to its ceiling.
fn merge_allowances(ip: Allowance, session: Allowance) -> Allowance {
    let tighter = if session.remaining < ip.remaining {
        session
    } else {
        ip
    };

    Allowance {
        remaining: tighter.remaining,
        limit: tighter.limit,
        degraded: ip.degraded.or(session.degraded),
    }
}
