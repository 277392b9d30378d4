use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlink_common::time::{Clock, MockClock};
use fieldlink_core::{QueueStore, TokenRefresher, TokenStore};
use fieldlink_domain::{
    AuthError, CacheError, NewQueuedRequest, QueueId, QueueStatus, QueuedRequest, Token,
};

/// In-memory mock for `TokenStore`.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<Token>>,
    save_latency: Mutex<Duration>,
}

impl MemoryTokenStore {
    pub fn stored(&self) -> Option<Token> {
        self.token.lock().unwrap().clone()
    }

    /// Make every later `save` take `latency` of (tokio) time before writing
    pub fn delay_saves(&self, latency: Duration) {
        *self.save_latency.lock().unwrap() = latency;
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Token>, CacheError> {
        Ok(self.stored())
    }

    async fn save(&self, token: &Token) -> Result<(), CacheError> {
        let latency = *self.save_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

/// `TokenRefresher` issuing `access-1`, `access-2`, ... and counting calls.
///
/// Each refresh takes `latency` of (tokio) time so concurrent callers
/// genuinely overlap.
pub struct CountingRefresher {
    clock: MockClock,
    calls: AtomicU32,
    latency: Mutex<Duration>,
    failure: Mutex<Option<AuthError>>,
    rotate_refresh: Mutex<bool>,
}

impl CountingRefresher {
    pub fn new(clock: MockClock) -> Self {
        Self {
            clock,
            calls: AtomicU32::new(0),
            latency: Mutex::new(Duration::from_millis(50)),
            failure: Mutex::new(None),
            rotate_refresh: Mutex::new(false),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, error: AuthError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Issue a new refresh value with every token
    pub fn rotate_refresh_values(&self) {
        *self.rotate_refresh.lock().unwrap() = true;
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, _refresh_value: &str) -> Result<Token, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = *self.latency.lock().unwrap();
        tokio::time::sleep(latency).await;

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let token =
            Token::bearer(format!("access-{n}"), self.clock.now_utc(), Duration::from_secs(15 * 60))?;
        if *self.rotate_refresh.lock().unwrap() {
            return Ok(token.with_refresh_value(format!("refresh-{n}")));
        }
        Ok(token)
    }
}

/// In-memory mock for `QueueStore`.
#[derive(Default)]
pub struct MemoryQueueStore {
    rows: Mutex<Vec<QueuedRequest>>,
    next_id: Mutex<QueueId>,
    status_log: Mutex<Vec<(QueueId, QueueStatus)>>,
}

impl MemoryQueueStore {
    pub fn rows(&self) -> Vec<QueuedRequest> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, id: QueueId) -> Option<QueuedRequest> {
        self.rows.lock().unwrap().iter().find(|row| row.id == id).cloned()
    }

    /// Every status transition applied, in order
    pub fn status_log(&self) -> Vec<(QueueId, QueueStatus)> {
        self.status_log.lock().unwrap().clone()
    }

    /// Overwrite a row directly, e.g. to simulate a crash mid-replay
    pub fn put(&self, row: QueuedRequest) {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|existing| existing.id != row.id);
        rows.push(row);
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, record: NewQueuedRequest) -> Result<QueueId, CacheError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        self.rows.lock().unwrap().push(record.into_record(*next_id));
        Ok(*next_id)
    }

    async fn list_pending(&self) -> Result<Vec<QueuedRequest>, CacheError> {
        Ok(self.rows().into_iter().filter(|row| row.status == QueueStatus::Pending).collect())
    }

    async fn list_queued(&self) -> Result<Vec<QueuedRequest>, CacheError> {
        Ok(self.rows().into_iter().filter(|row| row.status != QueueStatus::Completed).collect())
    }

    async fn count_pending(&self) -> Result<usize, CacheError> {
        Ok(self.list_pending().await?.len())
    }

    async fn update_status(
        &self,
        id: QueueId,
        status: QueueStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| CacheError::StorageUnavailable(format!("no row {id}")))?;
        row.status = status;
        if status == QueueStatus::Syncing {
            row.last_attempt_at = Some(at);
        }
        self.status_log.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn record_failure(&self, id: QueueId, error: &str) -> Result<(), CacheError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.retry_count += 1;
            row.last_error = Some(error.to_string());
            row.status = QueueStatus::Pending;
        }
        Ok(())
    }

    async fn delete(&self, id: QueueId) -> Result<(), CacheError> {
        self.rows.lock().unwrap().retain(|row| row.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.status == QueueStatus::Completed);
        Ok(before - rows.len())
    }

    async fn recover_in_flight(&self) -> Result<usize, CacheError> {
        let mut rows = self.rows.lock().unwrap();
        let mut recovered = 0;
        for row in rows.iter_mut().filter(|row| row.status == QueueStatus::Syncing) {
            row.status = QueueStatus::Pending;
            recovered += 1;
        }
        Ok(recovered)
    }
}
