//! Shared test helpers for `fieldlink-core` integration tests.
//!
//! Lightweight in-memory ports so the tests can focus on pipeline behaviour
//! instead of boilerplate.

#![allow(dead_code)]

pub mod network;
pub mod stores;

use std::sync::Arc;
use std::time::Duration;

use fieldlink_common::time::{Clock, MockClock};
use fieldlink_core::{OfflineQueue, RequestPipeline, RetryController, TokenLifecycleManager};
use fieldlink_domain::{QueueConfig, RetryConfig, Token};

pub use network::{MockTransport, RecordingDispatcher, ToggleConnectivity};
pub use stores::{CountingRefresher, MemoryQueueStore, MemoryTokenStore};

pub const REFRESH_WINDOW: Duration = Duration::from_secs(300);

/// Token issued now, valid for 15 minutes, refreshable
pub fn login_token(clock: &MockClock) -> Token {
    Token::bearer("access-0", clock.now_utc(), Duration::from_secs(15 * 60))
        .unwrap()
        .with_refresh_value("refresh-0")
}

/// Every port of a pipeline, wired against mocks
pub struct Harness {
    pub clock: MockClock,
    pub transport: Arc<MockTransport>,
    pub connectivity: Arc<ToggleConnectivity>,
    pub token_store: Arc<MemoryTokenStore>,
    pub refresher: Arc<CountingRefresher>,
    pub queue_store: Arc<MemoryQueueStore>,
    pub tokens: TokenLifecycleManager<MockClock>,
    pub queue: Arc<OfflineQueue<MockClock>>,
    pub pipeline: RequestPipeline<MockClock>,
}

impl Harness {
    pub fn new(transport: MockTransport) -> Self {
        let clock = MockClock::new();
        let shared_clock = Arc::new(clock.clone());
        let transport = Arc::new(transport);
        let connectivity = Arc::new(ToggleConnectivity::online());
        let token_store = Arc::new(MemoryTokenStore::default());
        let refresher = Arc::new(CountingRefresher::new(clock.clone()));
        let queue_store = Arc::new(MemoryQueueStore::default());

        let tokens = TokenLifecycleManager::with_clock(
            token_store.clone(),
            refresher.clone(),
            REFRESH_WINDOW,
            Arc::clone(&shared_clock),
        );
        let queue = Arc::new(OfflineQueue::with_clock(
            queue_store.clone(),
            connectivity.clone(),
            QueueConfig::default(),
            Arc::clone(&shared_clock),
        ));
        let retry = Arc::new(RetryController::new(RetryConfig::default(), connectivity.clone()));
        let pipeline = RequestPipeline::new(
            tokens.clone(),
            retry,
            Arc::clone(&queue),
            transport.clone(),
            connectivity.clone(),
        );

        Self {
            clock,
            transport,
            connectivity,
            token_store,
            refresher,
            queue_store,
            tokens,
            queue,
            pipeline,
        }
    }

    /// Store the standard login token
    pub async fn login(&self) {
        self.tokens.store_token(login_token(&self.clock)).await.unwrap();
    }
}
