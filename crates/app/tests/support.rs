//! Shared helpers for `fieldlink-app` integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldlink_app::PipelineContext;
use fieldlink_domain::{PipelineConfig, Token};
use fieldlink_infra::InMemoryTokenStore;

/// Configuration pointing at `base_url` with the queue database under `dir`
pub fn test_config(base_url: &str, dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.api.base_url = base_url.to_string();
    config.api.request_timeout = Duration::from_secs(5);
    config.database.path = dir.join("queue.db").to_string_lossy().into_owned();
    config.database.pool_size = 2;
    config.retry.max_retries = 1;
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter_ratio = 0.0;
    // Replays in these tests are driven by reconnects, not the timer
    config.queue.replay_interval = Duration::from_secs(3600);
    config
}

/// Token valid for 15 minutes
pub fn login_token(access: &str) -> Token {
    Token::bearer(access, Utc::now(), Duration::from_secs(15 * 60))
        .expect("token should be valid")
        .with_refresh_value("refresh-0")
}

/// Context backed by an in-memory token store
pub async fn start_context(config: PipelineConfig, token: Option<Token>) -> PipelineContext {
    let store = match token {
        Some(token) => InMemoryTokenStore::with_token(token),
        None => InMemoryTokenStore::new(),
    };
    PipelineContext::with_token_store(config, Arc::new(store))
        .await
        .expect("context should start")
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
