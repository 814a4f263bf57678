// src/tests/limiter_tests.rs

use http::{HeaderMap, HeaderValue, Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::algorithms::DenyReason;
use crate::clock::ManualClock;
use crate::config::{AdmissionConfig, LimiterConfig};
use crate::limiter::{Denial, RateLimiter, SessionScope, Verdict};
use crate::record::Scope;
use crate::resilience::RetryConfig;
use crate::response::ErrorCode;
use crate::test_utils::MockStore;
use crate::updater::DegradedCause;

const T0: i64 = 1_700_000_000_000;

fn limiter(store: &MockStore, clock: &ManualClock) -> RateLimiter<MockStore> {
    let config = AdmissionConfig {
        retry: RetryConfig::immediate(),
        ..AdmissionConfig::default()
    };
    RateLimiter::with_clock(Arc::new(store.clone()), Arc::new(clock.clone()), &config)
}

fn from_ip(ip: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
    headers
}

fn expect_denial(verdict: Verdict) -> Denial {
    match verdict {
        Verdict::Denied(denial) => denial,
        other => panic!("expected denial, got {:?}", other),
    }
}

// 10 rapid requests pass, the 11th hits the burst ceiling
#[tokio::test]
async fn test_public_api_burst() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let headers = from_ip("1.2.3.4");

    for i in 0..10 {
        let verdict = limiter
            .admit(&headers, &LimiterConfig::PUBLIC_API, None)
            .await;
        assert!(verdict.is_allowed(), "Request {} should be allowed", i);
        clock.advance(Duration::from_millis(100));
    }

    let denial = expect_denial(
        limiter
            .admit(&headers, &LimiterConfig::PUBLIC_API, None)
            .await,
    );
    assert_eq!(denial.scope, Scope::Ip);
    assert_eq!(denial.reason, DenyReason::BurstExceeded);
    assert_eq!(denial.retry_after_secs, 10);

    let rejection = Verdict::Denied(denial).rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::RateLimitExceeded);
    assert_eq!(rejection.body().retry_after, 10);
}

// Session scope: one view per board per session per window
#[tokio::test]
async fn test_analytics_session_scope() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let config = LimiterConfig::ANALYTICS;
    let board_x = SessionScope::new("s1", "board-x").unwrap();
    let board_y = SessionScope::new("s1", "board-y").unwrap();

    // the IP scope shares the preset, so each call comes from a fresh address
    let first = limiter
        .admit(&from_ip("10.0.0.1"), &config, Some(&board_x))
        .await;
    assert!(first.is_allowed());

    clock.advance(Duration::from_secs(60));
    let denial = expect_denial(
        limiter
            .admit(&from_ip("10.0.0.2"), &config, Some(&board_x))
            .await,
    );
    assert_eq!(denial.scope, Scope::Session);
    assert_eq!(denial.reason, DenyReason::WindowExceeded);
    assert_eq!(denial.retry_after_secs, 240);
    assert_eq!(
        Verdict::Denied(denial).rejection().unwrap().code,
        ErrorCode::SessionLimitExceeded
    );

    let other_board = limiter
        .admit(&from_ip("10.0.0.3"), &config, Some(&board_y))
        .await;
    assert!(other_board.is_allowed());
}

// Separators inside session parts do not merge different sessions
#[tokio::test]
async fn test_session_parts_with_separators_stay_apart() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let config = LimiterConfig::ANALYTICS;
    let first = SessionScope::new("a:b", "c").unwrap();
    let second = SessionScope::new("a", "b:c").unwrap();

    assert!(limiter
        .admit(&from_ip("10.0.0.1"), &config, Some(&first))
        .await
        .is_allowed());
    assert!(limiter
        .admit(&from_ip("10.0.0.2"), &config, Some(&second))
        .await
        .is_allowed());

    // each pair still has its own one-view window
    let denial = expect_denial(
        limiter
            .admit(&from_ip("10.0.0.3"), &config, Some(&first))
            .await,
    );
    assert_eq!(denial.scope, Scope::Session);
}

// Three signups per minute; the fourth is told when to come back
#[tokio::test]
async fn test_signup_window() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let headers = from_ip("198.51.100.7");

    for i in 0..3 {
        let verdict = limiter.admit(&headers, &LimiterConfig::SIGNUP, None).await;
        assert!(verdict.is_allowed(), "Signup {} should be allowed", i);
        // spaced past the burst window of one
        clock.advance(Duration::from_secs(15));
    }

    let denial = expect_denial(limiter.admit(&headers, &LimiterConfig::SIGNUP, None).await);
    assert_eq!(denial.reason, DenyReason::WindowExceeded);
    assert!((1..=60).contains(&denial.retry_after_secs));
    assert_eq!(denial.reset_at_ms, T0 + 45_000 + denial.retry_after_secs as i64 * 1_000);

    let rejection = Verdict::Denied(denial).rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::RateLimitExceeded);
    let response = rejection.into_response().unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

// An IP denial never touches the session record
#[tokio::test]
async fn test_ip_denial_short_circuits_session() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let headers = from_ip("1.2.3.4");
    let config = LimiterConfig::ANALYTICS;

    let first = SessionScope::new("s1", "board-x").unwrap();
    assert!(limiter.admit(&headers, &config, Some(&first)).await.is_allowed());

    let second = SessionScope::new("s1", "board-z").unwrap();
    let denial = expect_denial(limiter.admit(&headers, &config, Some(&second)).await);
    assert_eq!(denial.scope, Scope::Ip);

    assert_eq!(store.get_count("ratelimit:session:s1:board-z"), 0);
    assert_eq!(store.set_count("ratelimit:session:s1:board-z"), 0);
    assert_eq!(store.get_count("ratelimit:ip:1.2.3.4"), 2);
}

// Without both session parts only the IP scope runs
#[tokio::test]
async fn test_incomplete_session_is_ignored() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);

    assert!(SessionScope::from_parts(Some("s1"), None).is_none());
    assert!(SessionScope::from_parts(None, Some("board-x")).is_none());
    assert!(SessionScope::from_parts(Some(""), Some("board-x")).is_none());

    let session = SessionScope::from_parts(Some("s1"), None);
    let verdict = limiter
        .admit(&from_ip("1.2.3.4"), &LimiterConfig::SIGNUP, session.as_ref())
        .await;
    assert!(verdict.is_allowed());
    assert_eq!(store.total_sets(), 1);
}

// Requests without any address header share one bucket
#[tokio::test]
async fn test_unknown_clients_share_a_bucket() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let anonymous = HeaderMap::new();

    assert_eq!(limiter.client_ip(&anonymous), "unknown");
    assert!(limiter
        .admit(&anonymous, &LimiterConfig::ANALYTICS, None)
        .await
        .is_allowed());
    assert!(!limiter
        .admit(&HeaderMap::new(), &LimiterConfig::ANALYTICS, None)
        .await
        .is_allowed());
    assert_eq!(store.set_count("ratelimit:ip:unknown"), 1);
}

// Allowed verdicts report the scope closest to its ceiling
#[tokio::test]
async fn test_allowance_reports_tighter_scope() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);
    let headers = from_ip("1.2.3.4");
    let session = SessionScope::new("s1", "form").unwrap();

    // warm the session bucket from another address
    limiter
        .admit(&from_ip("5.6.7.8"), &LimiterConfig::SIGNUP, Some(&session))
        .await;
    clock.advance(Duration::from_secs(15));

    match limiter
        .admit(&headers, &LimiterConfig::SIGNUP, Some(&session))
        .await
    {
        Verdict::Allowed(allowance) => {
            assert_eq!(allowance.remaining, 1, "session has one left, ip has two");
            assert_eq!(allowance.limit, 3);
            assert_eq!(allowance.degraded, None);
        }
        other => panic!("expected allow, got {:?}", other),
    }
}

// Contention on the store degrades to an uncounted allow
#[tokio::test]
async fn test_contention_is_not_a_denial() {
    let store = MockStore::always_conflicting();
    let clock = ManualClock::new(T0);
    let limiter = limiter(&store, &clock);

    match limiter
        .admit(&from_ip("1.2.3.4"), &LimiterConfig::PUBLIC_API, None)
        .await
    {
        Verdict::Allowed(allowance) => {
            assert_eq!(allowance.remaining, 0);
            assert_eq!(allowance.degraded, Some(DegradedCause::Contention));
        }
        other => panic!("expected allow, got {:?}", other),
    }
}

// Configured prefix and header list flow into the record keys
#[test]
fn test_admit_request_uses_configured_keys() {
    let store = MockStore::new();
    let clock = ManualClock::new(T0);
    let config = AdmissionConfig {
        key_prefix: "edge".to_string(),
        client_ip_headers: vec!["x-real-ip".to_string()],
        retry: RetryConfig::immediate(),
        ..AdmissionConfig::default()
    };
    let limiter =
        RateLimiter::with_clock(Arc::new(store.clone()), Arc::new(clock.clone()), &config);

    let request = Request::builder()
        .uri("/api/boards")
        .header("x-forwarded-for", "203.0.113.1")
        .header("x-real-ip", "192.0.2.5")
        .body(())
        .unwrap();

    let verdict = tokio_test::block_on(limiter.admit_request(
        &request,
        &LimiterConfig::PUBLIC_API,
        None,
    ));

    assert!(verdict.is_allowed());
    assert_eq!(store.set_count("edge:ip:192.0.2.5"), 1);
    assert_eq!(store.set_count("edge:ip:203.0.113.1"), 0);
}
