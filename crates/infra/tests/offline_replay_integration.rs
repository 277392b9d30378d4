//! End-to-end replay of offline writes over HTTP.
//!
//! A real pipeline (reqwest transport, SQLite queue, HTTP refresher) runs
//! against a wiremock backend while the connectivity monitor is toggled.

mod support;

use std::sync::Arc;
use std::time::Duration;

use fieldlink_domain::{ApiRequest, ErrorCategory};
use fieldlink_infra::{QueueReplayWorker, ReplayWorkerConfig};
use serde_json::json;
use support::{eventually, Stack, REFRESH_PATH};
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Validates the offline write lifecycle end to end.
///
/// Assertions:
/// - Ensures an offline write is accepted with a queue id and persisted.
/// - Ensures reconnecting triggers the worker to replay it with fresh
///   credentials and the original request id.
/// - Ensures the row is removed once the server accepts it.
#[tokio::test(flavor = "multi_thread")]
async fn offline_write_is_replayed_after_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/deliveries/17/confirm"))
        .and(header("Authorization", "Bearer access-0"))
        .and(header("X-Request-ID", "req-offline-1"))
        .and(body_json(json!({"signedBy": "A. Driver"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let stack = Stack::new(&server.uri(), false);
    stack.login("access-0").await;

    let request = ApiRequest::post("/api/v1/deliveries/17/confirm", json!({"signedBy": "A. Driver"}))
        .with_header("X-Request-ID", "req-offline-1");
    let accepted = stack.pipeline.send(request).await.unwrap();

    assert_eq!(accepted.status, 202);
    assert_eq!(accepted.body.as_ref().unwrap()["queued"], json!(true));
    assert_eq!(stack.db.row_count(), 1);

    let mut worker = QueueReplayWorker::new(
        stack.pipeline.clone(),
        stack.monitor.subscribe(),
        ReplayWorkerConfig { replay_interval: Duration::from_secs(3600), ..Default::default() },
    );
    worker.start().unwrap();
    stack.monitor.set_online(true);

    let db = &stack.db;
    eventually(|| async { db.row_count() == 0 }).await;
    worker.stop().await.unwrap();
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_replay_stays_queued_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let stack = Stack::new(&server.uri(), false);
    stack.login("access-0").await;
    stack
        .pipeline
        .send(ApiRequest::put("/api/v1/stops/3", json!({"arrived": true})))
        .await
        .unwrap();

    stack.monitor.set_online(true);
    let report = stack.pipeline.process_queue().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 0);
    let pending = stack.pipeline.queue().get_stats().await.unwrap();
    assert_eq!(pending.pending, 1);

    let conn = stack.db.manager.get_connection().unwrap();
    let (retry_count, last_error, status): (i64, Option<String>, String) = conn
        .query_row("SELECT retry_count, last_error, status FROM request_queue", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap();
    assert_eq!(retry_count, 1);
    assert!(last_error.unwrap().contains("503"));
    assert_eq!(status, "pending");
}

/// Validates the reactive refresh over real HTTP.
///
/// Assertions:
/// - Ensures a 401 triggers exactly one call to the refresh endpoint.
/// - Ensures the request is replayed with the new access value.
/// - Ensures the rotated token reaches the token store.
#[tokio::test(flavor = "multi_thread")]
async fn rejected_credentials_are_refreshed_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/routes/today"))
        .and(header("Authorization", "Bearer access-0"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/routes/today"))
        .and(header("Authorization", "Bearer access-1"))
        .and(header_exists("X-Request-ID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stops": 12})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(body_json(json!({"refreshToken": "refresh-0"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "expiresIn": 900
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stack = Stack::new(&server.uri(), true);
    stack.login("access-0").await;

    let response = stack.pipeline.send(ApiRequest::get("/api/v1/routes/today")).await.unwrap();

    assert_eq!(response.body, Some(json!({"stops": 12})));
    let stored = stack.pipeline.tokens().current_token().unwrap();
    assert_eq!(stored.access_value, "access-1");
    assert_eq!(stored.refresh_value.as_deref(), Some("refresh-1"));
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn revoked_refresh_token_ends_the_session() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v1/routes/today")).respond_with(ResponseTemplate::new(401)).mount(&server).await;
    Mock::given(path(REFRESH_PATH)).respond_with(ResponseTemplate::new(401)).mount(&server).await;

    let stack = Stack::new(&server.uri(), true);
    stack.login("access-0").await;
    let mut auth_state = stack.pipeline.tokens().subscribe_auth_state();

    let err = stack.pipeline.send(ApiRequest::get("/api/v1/routes/today")).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Auth);
    assert!(!stack.pipeline.tokens().is_authenticated().await);
    assert!(!auth_state.recv().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_backend_is_a_network_error() {
    let stack = Stack::new("http://127.0.0.1:9", true);
    stack.login("access-0").await;
    let pipeline = Arc::clone(&stack.pipeline);

    let err = pipeline.send(ApiRequest::get("/api/v1/routes/today")).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Network);
    assert_eq!(stack.db.row_count(), 0);
}
