//! Shared helpers for `fieldlink-infra` integration tests.
//!
//! Wires a real pipeline against a wiremock backend and a temporary SQLite
//! queue so tests exercise the adapters end to end.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldlink_core::{OfflineQueue, RequestPipeline, RetryController, TokenLifecycleManager};
use fieldlink_domain::{QueueConfig, RetryConfig, Token};
use fieldlink_infra::database::DbManager;
use fieldlink_infra::{
    HttpClient, HttpTokenRefresher, InMemoryTokenStore, NetworkMonitor, ReqwestTransport,
    SqliteQueueStore,
};
use tempfile::TempDir;

pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";
pub const REFRESH_WINDOW: Duration = Duration::from_secs(300);

/// Temporary database that lives as long as the wrapper.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager = DbManager::new(temp_dir.path().join("queue.db"), 2)
            .expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Number of rows in the queue table regardless of status.
    pub fn row_count(&self) -> i64 {
        let conn = self.manager.get_connection().expect("connection should be available");
        conn.query_row("SELECT COUNT(*) FROM request_queue", [], |row| row.get(0))
            .expect("count query should succeed")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Retries fast enough for tests
pub fn fast_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        jitter_ratio: 0.0,
        ..RetryConfig::default()
    }
}

/// Token valid for 15 minutes, refreshable
pub fn login_token(access: &str) -> Token {
    Token::bearer(access, Utc::now(), Duration::from_secs(15 * 60))
        .expect("token should be valid")
        .with_refresh_value("refresh-0")
}

/// A production-shaped pipeline against `base_url`
pub struct Stack {
    pub db: TestDatabase,
    pub monitor: NetworkMonitor,
    pub token_store: Arc<InMemoryTokenStore>,
    pub pipeline: Arc<RequestPipeline>,
}

impl Stack {
    pub fn new(base_url: &str, online: bool) -> Self {
        let db = TestDatabase::new();
        let monitor = NetworkMonitor::new(online);
        let connectivity = Arc::new(monitor.clone());
        let client = HttpClient::builder(base_url)
            .timeout(Duration::from_secs(5))
            .build()
            .expect("client should build");

        let token_store = Arc::new(InMemoryTokenStore::new());
        let tokens = TokenLifecycleManager::new(
            token_store.clone(),
            Arc::new(HttpTokenRefresher::new(client.clone(), REFRESH_PATH)),
            REFRESH_WINDOW,
        );
        let queue = Arc::new(OfflineQueue::new(
            Arc::new(SqliteQueueStore::new(Arc::clone(&db.manager))),
            connectivity.clone(),
            QueueConfig::default(),
        ));
        let retry = Arc::new(RetryController::new(fast_retry_config(), connectivity.clone()));
        let pipeline = Arc::new(RequestPipeline::new(
            tokens,
            retry,
            queue,
            Arc::new(ReqwestTransport::new(client)),
            connectivity,
        ));

        Self { db, monitor, token_store, pipeline }
    }

    pub async fn login(&self, access: &str) {
        self.pipeline
            .tokens()
            .store_token(login_token(access))
            .await
            .expect("token should be stored");
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
