// src/updater.rs

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::admission_event;
use crate::algorithms::{evaluate, DenyReason, WindowDecision};
use crate::clock::Clock;
use crate::config::LimiterConfig;
use crate::error::LimiterError;
use crate::record::{RateLimitRecord, RecordKey};
use crate::resilience::{CircuitBreaker, ExponentialBackoff, RetryConfig};
use crate::storage::{RecordStore, WriteOutcome};

/// Read-evaluate-write cycles per admission, including the first.
pub const MAX_ATTEMPTS: usize = 3;

/// Why an admission was granted without being counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedCause {
    /// Every conditional write lost to a concurrent writer
    Contention,
    /// The store errored or the circuit breaker is open
    StoreUnavailable,
}

/// Outcome of one admission attempt against one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    Allowed {
        remaining: u32,
        limit: u32,
        /// Set when the request was let through without being recorded
        degraded: Option<DegradedCause>,
    },
    Denied {
        reason: DenyReason,
        retry_after_secs: u64,
        limit: u32,
        /// Epoch ms of the next eligible attempt
        reset_at_ms: i64,
    },
}

impl AdmissionResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionResult::Allowed { .. })
    }
}

enum Step {
    Decided(AdmissionResult),
    Conflict,
}

/// Runs read / evaluate / conditional-write against a shared store.
///
/// Writers of the same key race on the version stamp; a loser re-reads and re-evaluates.
/// After [`MAX_ATTEMPTS`] lost races, or on any store failure, the request is admitted
/// uncounted. Nothing here returns an error to the caller.
#[derive(Debug)]
pub struct OptimisticUpdater<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl<S: RecordStore> OptimisticUpdater<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, retry: RetryConfig) -> Self {
        Self {
            store,
            clock,
            retry,
            breaker: None,
        }
    }

    /// Skip the store entirely while `breaker` is open
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn attempt_admission(
        &self,
        key: &RecordKey,
        config: &LimiterConfig,
    ) -> AdmissionResult {
        let mut backoff = ExponentialBackoff::new(self.retry.clone(), MAX_ATTEMPTS - 1);

        for attempt in 1..=MAX_ATTEMPTS {
            if !self.store_available().await {
                return self.fail_open(
                    key,
                    config,
                    DegradedCause::StoreUnavailable,
                    attempt,
                    "circuit open",
                );
            }

            match self.try_once(key, config).await {
                Ok(Step::Decided(result)) => {
                    self.record_store_success().await;
                    return result;
                }
                Ok(Step::Conflict) => {
                    self.record_store_success().await;
                    debug!(key = %key, attempt, "Conditional write lost, retrying");

                    if attempt < MAX_ATTEMPTS {
                        if let Some(delay) = backoff.next_backoff() {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure().await;
                    }
                    return self.fail_open(
                        key,
                        config,
                        DegradedCause::StoreUnavailable,
                        attempt,
                        &e.to_string(),
                    );
                }
            }
        }

        self.fail_open(
            key,
            config,
            DegradedCause::Contention,
            MAX_ATTEMPTS,
            "conditional writes exhausted",
        )
    }

    async fn try_once(
        &self,
        key: &RecordKey,
        config: &LimiterConfig,
    ) -> Result<Step, LimiterError> {
        let current = self.store.get(key.as_str()).await?;

        let timestamps = match current.value.as_deref() {
            None => Vec::new(),
            Some(bytes) => match RateLimitRecord::decode(bytes) {
                Ok(record) => record.into_timestamps(),
                Err(e) => {
                    // overwritten on the next successful write
                    warn!(key = %key, error = %e, "Discarding unreadable rate limit record");
                    Vec::new()
                }
            },
        };

        let now = self.clock.now_ms();
        let limit = config.max_requests();

        match evaluate(&timestamps, now, config) {
            WindowDecision::Deny {
                reason,
                retry_after_secs,
            } => {
                admission_event!(
                    key.scope().as_str(),
                    key.as_str(),
                    false,
                    limit,
                    config.window_ms()
                );
                Ok(Step::Decided(AdmissionResult::Denied {
                    reason,
                    retry_after_secs,
                    limit,
                    reset_at_ms: reset_at(now, retry_after_secs),
                }))
            }
            WindowDecision::Allow { next, remaining } => {
                let encoded = next.encode()?;
                let outcome = self
                    .store
                    .conditional_set(
                        key.as_str(),
                        &encoded,
                        current.stamp.as_ref(),
                        config.window(),
                    )
                    .await?;

                match outcome {
                    WriteOutcome::Applied(_) => {
                        admission_event!(
                            key.scope().as_str(),
                            key.as_str(),
                            true,
                            limit,
                            config.window_ms()
                        );
                        Ok(Step::Decided(AdmissionResult::Allowed {
                            remaining,
                            limit,
                            degraded: None,
                        }))
                    }
                    WriteOutcome::Conflict => Ok(Step::Conflict),
                }
            }
        }
    }

    fn fail_open(
        &self,
        key: &RecordKey,
        config: &LimiterConfig,
        cause: DegradedCause,
        attempts: usize,
        detail: &str,
    ) -> AdmissionResult {
        warn!(
            key = %key,
            cause = ?cause,
            attempts,
            detail,
            "Admitting request without recording it"
        );

        AdmissionResult::Allowed {
            remaining: 0,
            limit: config.max_requests(),
            degraded: Some(cause),
        }
    }

    async fn store_available(&self) -> bool {
        match &self.breaker {
            Some(breaker) => breaker.allow_request().await,
            None => true,
        }
    }

    async fn record_store_success(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_success().await;
        }
    }
}

fn reset_at(now_ms: i64, retry_after_secs: u64) -> i64 {
    i64::try_from(retry_after_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1_000)
        .saturating_add(now_ms)
}
