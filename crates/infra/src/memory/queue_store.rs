use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlink_core::QueueStore;
use fieldlink_domain::{CacheError, NewQueuedRequest, QueueId, QueueStatus, QueuedRequest};
use parking_lot::Mutex;

#[derive(Default)]
struct Table {
    rows: Vec<QueuedRequest>,
    last_id: QueueId,
}

impl Table {
    fn row_mut(&mut self, id: QueueId) -> Result<&mut QueuedRequest, CacheError> {
        self.rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| CacheError::Corrupted(format!("queue record {id} not found")))
    }
}

/// Process-lifetime `QueueStore`; ids are never reused
#[derive(Default)]
pub struct InMemoryQueueStore {
    table: Mutex<Table>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row regardless of status
    pub fn snapshot(&self) -> Vec<QueuedRequest> {
        self.table.lock().rows.clone()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn insert(&self, record: NewQueuedRequest) -> Result<QueueId, CacheError> {
        let mut table = self.table.lock();
        table.last_id += 1;
        let id = table.last_id;
        table.rows.push(record.into_record(id));
        Ok(id)
    }

    async fn list_pending(&self) -> Result<Vec<QueuedRequest>, CacheError> {
        let table = self.table.lock();
        Ok(table.rows.iter().filter(|row| row.status == QueueStatus::Pending).cloned().collect())
    }

    async fn list_queued(&self) -> Result<Vec<QueuedRequest>, CacheError> {
        let table = self.table.lock();
        Ok(table.rows.iter().filter(|row| row.status != QueueStatus::Completed).cloned().collect())
    }

    async fn count_pending(&self) -> Result<usize, CacheError> {
        let table = self.table.lock();
        Ok(table.rows.iter().filter(|row| row.status == QueueStatus::Pending).count())
    }

    async fn update_status(
        &self,
        id: QueueId,
        status: QueueStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut table = self.table.lock();
        let row = table.row_mut(id)?;
        row.status = status;
        if status == QueueStatus::Syncing {
            row.last_attempt_at = Some(at);
        }
        Ok(())
    }

    async fn record_failure(&self, id: QueueId, error: &str) -> Result<(), CacheError> {
        let mut table = self.table.lock();
        let row = table.row_mut(id)?;
        row.retry_count = row.retry_count.saturating_add(1);
        row.last_error = Some(error.to_string());
        row.status = QueueStatus::Pending;
        Ok(())
    }

    async fn delete(&self, id: QueueId) -> Result<(), CacheError> {
        self.table.lock().rows.retain(|row| row.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut table = self.table.lock();
        let before = table.rows.len();
        table.rows.retain(|row| row.status == QueueStatus::Completed);
        Ok(before - table.rows.len())
    }

    async fn recover_in_flight(&self) -> Result<usize, CacheError> {
        let mut table = self.table.lock();
        let mut recovered = 0;
        for row in table.rows.iter_mut().filter(|row| row.status == QueueStatus::Syncing) {
            row.status = QueueStatus::Pending;
            recovered += 1;
        }
        Ok(recovered)
    }
}
