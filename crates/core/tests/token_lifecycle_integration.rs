//! Token lifecycle behaviour under concurrency and simulated time

mod support;

use std::time::Duration;

use fieldlink_domain::{AuthError, TokenState, TransportError};
use support::{Harness, MockTransport};

/// Validates refresh mutual exclusion.
///
/// Assertions:
/// - Ensures N concurrent callers against an expired token cause exactly one refresh.
/// - Ensures every caller receives the same new token value.
#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_a_single_refresh() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    harness.clock.advance(Duration::from_secs(16 * 60));
    assert_eq!(harness.tokens.state(), TokenState::Expired);

    let mut handles = Vec::new();
    for _ in 0..12 {
        let tokens = harness.tokens.clone();
        handles.push(tokio::spawn(async move { tokens.get_access_token().await }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(harness.refresher.calls(), 1);
    assert!(values.iter().all(|value| value == "access-1"), "{values:?}");
    assert_eq!(harness.token_store.stored().unwrap().access_value, "access-1");
}

/// Validates the proactive refresh scenario.
///
/// Assertions:
/// - Ensures the still-current token is returned inside the refresh window.
/// - Ensures exactly one background refresh runs.
/// - Ensures `tokenRefreshed` emits the new token once it completes.
#[tokio::test(start_paused = true)]
async fn near_expiry_returns_current_token_and_refreshes_in_background() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    let mut refreshed = harness.tokens.subscribe_token_refreshed();

    harness.clock.advance(Duration::from_secs(10 * 60));
    assert_eq!(harness.tokens.state(), TokenState::NearExpiry);

    assert_eq!(harness.tokens.get_access_token().await.unwrap(), "access-0");
    assert_eq!(harness.tokens.get_access_token().await.unwrap(), "access-0");

    let token = refreshed.recv().await.unwrap().expect("refreshed token");
    assert_eq!(token.access_value, "access-1");
    assert_eq!(token.refresh_value.as_deref(), Some("refresh-0"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.refresher.calls(), 1);
    assert_eq!(harness.tokens.get_access_token().await.unwrap(), "access-1");
}

#[tokio::test(start_paused = true)]
async fn rotated_refresh_value_is_adopted() {
    let harness = Harness::new(MockTransport::ok());
    harness.refresher.rotate_refresh_values();
    harness.login().await;

    let token = harness.tokens.refresh().await.unwrap();

    assert_eq!(token.refresh_value.as_deref(), Some("refresh-1"));
    assert_eq!(
        harness.token_store.stored().unwrap().refresh_value.as_deref(),
        Some("refresh-1")
    );
}

/// Validates the fatal refresh path.
///
/// Assertions:
/// - Ensures concurrent callers all see `InvalidRefreshToken`.
/// - Ensures the session is cleared and subscribers see `false`.
#[tokio::test(start_paused = true)]
async fn rejected_refresh_logs_everyone_out() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    let mut auth_state = harness.tokens.subscribe_auth_state();
    harness.refresher.fail_with(AuthError::InvalidRefreshToken);
    harness.clock.advance(Duration::from_secs(20 * 60));

    let first = harness.tokens.clone();
    let second = harness.tokens.clone();
    let (a, b) = tokio::join!(first.get_access_token(), second.get_access_token());

    assert_eq!(a, Err(AuthError::InvalidRefreshToken));
    assert_eq!(b, Err(AuthError::InvalidRefreshToken));
    assert_eq!(harness.refresher.calls(), 1);
    assert!(!auth_state.recv().await.unwrap());
    assert!(harness.token_store.stored().is_none());
    assert_eq!(harness.tokens.state(), TokenState::NoToken);
}

#[tokio::test(start_paused = true)]
async fn network_failure_during_refresh_keeps_session() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    harness
        .refresher
        .fail_with(AuthError::Network(TransportError::ConnectionError("unreachable".into())));
    harness.clock.advance(Duration::from_secs(20 * 60));

    let err = harness.tokens.get_access_token().await.unwrap_err();

    assert!(matches!(err, AuthError::Network(_)));
    assert!(!err.requires_login());
    assert_eq!(harness.token_store.stored().unwrap().access_value, "access-0");
}

#[tokio::test(start_paused = true)]
async fn is_authenticated_refreshes_expired_token() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    harness.clock.advance(Duration::from_secs(16 * 60));

    assert!(harness.tokens.is_authenticated().await);
    assert_eq!(harness.refresher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_during_refresh_is_not_undone() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    harness.clock.advance(Duration::from_secs(16 * 60));

    let tokens = harness.tokens.clone();
    let pending = tokio::spawn(async move { tokens.get_access_token().await });
    tokio::task::yield_now().await;
    assert_eq!(harness.tokens.state(), TokenState::Refreshing);

    harness.tokens.clear_tokens().await.unwrap();
    let outcome = pending.await.unwrap();

    assert_eq!(outcome, Err(AuthError::NoToken));
    assert!(harness.tokens.current_token().is_none());
    assert!(harness.token_store.stored().is_none());
}

/// Validates logout while a refreshed token is still being persisted.
///
/// Assertions:
/// - Ensures the refresh resolves to `NoToken` instead of restoring the session.
/// - Ensures the late save is undone so nothing stays persisted.
/// - Ensures subscribers see the logout and no refreshed token after it.
#[tokio::test(start_paused = true)]
async fn logout_while_refreshed_token_is_saved_stays_logged_out() {
    let harness = Harness::new(MockTransport::ok());
    harness.login().await;
    harness.token_store.delay_saves(Duration::from_millis(100));
    let mut refreshed = harness.tokens.subscribe_token_refreshed();

    let tokens = harness.tokens.clone();
    let pending = tokio::spawn(async move { tokens.refresh().await });
    // Refresher answers after 50ms; the save then runs until 150ms
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(harness.refresher.calls(), 1);

    harness.tokens.clear_tokens().await.unwrap();
    let outcome = pending.await.unwrap();

    assert_eq!(outcome, Err(AuthError::NoToken));
    assert!(harness.tokens.current_token().is_none());
    assert!(harness.token_store.stored().is_none());
    assert!(!harness.tokens.is_authenticated().await);
    assert_eq!(refreshed.try_recv().unwrap(), None);
    assert!(refreshed.try_recv().is_err());
}
