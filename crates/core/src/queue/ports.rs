//! Port interfaces for the offline queue

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlink_domain::{
    ApiRequest, ApiResponse, CacheError, NewQueuedRequest, PipelineError, QueueId, QueueStatus,
    QueuedRequest,
};

/// Durable record table for queued writes
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new pending record and return its id
    async fn insert(&self, record: NewQueuedRequest) -> Result<QueueId, CacheError>;

    /// All records in `Pending` status, in insertion order
    async fn list_pending(&self) -> Result<Vec<QueuedRequest>, CacheError>;

    /// All records not yet delivered: `Pending`, plus `Syncing` ones a pass
    /// is sending or abandoned
    async fn list_queued(&self) -> Result<Vec<QueuedRequest>, CacheError>;

    /// Number of records in `Pending` status
    async fn count_pending(&self) -> Result<usize, CacheError>;

    /// Move a record to `status`, stamping the attempt time when it enters
    /// `Syncing`
    async fn update_status(
        &self,
        id: QueueId,
        status: QueueStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CacheError>;

    /// Return a record to `Pending` with its retry count incremented and
    /// `error` recorded
    async fn record_failure(&self, id: QueueId, error: &str) -> Result<(), CacheError>;

    /// Delete a record
    async fn delete(&self, id: QueueId) -> Result<(), CacheError>;

    /// Delete every non-completed record, returning how many were removed
    async fn clear(&self) -> Result<usize, CacheError>;

    /// Reset records left in `Syncing` by an interrupted pass back to
    /// `Pending`, returning how many were reset
    async fn recover_in_flight(&self) -> Result<usize, CacheError>;
}

/// Delivers a replayed request with credentials and retries, bypassing the
/// offline gate
#[async_trait]
pub trait ReplayDispatcher: Send + Sync {
    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, PipelineError>;
}
