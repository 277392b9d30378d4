//! SQLite-backed implementation of the offline queue port.
//!
//! Each row keeps the replayable request as a JSON `payload` next to
//! denormalised `entity_type`/`entity_id`/`operation` columns derived from the
//! request path and method, so the table can be inspected without decoding
//! JSON. Timestamps are stored as epoch milliseconds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlink_core::QueueStore;
use fieldlink_domain::{
    CacheError, Headers, HttpMethod, NewQueuedRequest, Priority, QueueId, QueueStatus,
    QueuedRequest,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{debug, instrument, warn};

use super::manager::DbManager;
use crate::errors::InfraError;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPayload {
    method: HttpMethod,
    path: String,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Queue store persisted in the SQLite database owned by [`DbManager`].
pub struct SqliteQueueStore {
    db: Arc<DbManager>,
}

impl SqliteQueueStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, InfraError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            op(&conn)
        })
        .await
        .map_err(map_join_error)?
        .map_err(CacheError::from)
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    #[instrument(skip_all, fields(path = %record.path))]
    async fn insert(&self, record: NewQueuedRequest) -> Result<QueueId, CacheError> {
        let id = self.blocking(move |conn| insert_record(conn, &record)).await?;
        debug!(queue_id = id, "queued request persisted");
        Ok(id)
    }

    async fn list_pending(&self) -> Result<Vec<QueuedRequest>, CacheError> {
        self.blocking(|conn| load_records(conn, SELECT_PENDING_SQL)).await
    }

    async fn list_queued(&self) -> Result<Vec<QueuedRequest>, CacheError> {
        self.blocking(|conn| load_records(conn, SELECT_QUEUED_SQL)).await
    }

    async fn count_pending(&self) -> Result<usize, CacheError> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM request_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn update_status(
        &self,
        id: QueueId,
        status: QueueStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.blocking(move |conn| {
            let at = at.timestamp_millis();
            let changed = match status {
                QueueStatus::Syncing => conn.execute(
                    "UPDATE request_queue SET status = ?1, last_attempt_at = ?2 WHERE id = ?3",
                    params![status.to_string(), at, id],
                )?,
                QueueStatus::Completed => conn.execute(
                    "UPDATE request_queue SET status = ?1, completed_at = ?2 WHERE id = ?3",
                    params![status.to_string(), at, id],
                )?,
                QueueStatus::Pending => conn.execute(
                    "UPDATE request_queue SET status = ?1 WHERE id = ?2",
                    params![status.to_string(), id],
                )?,
            };
            ensure_found(id, changed)
        })
        .await
    }

    async fn record_failure(&self, id: QueueId, error: &str) -> Result<(), CacheError> {
        let error = error.to_string();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE request_queue
                 SET retry_count = retry_count + 1, last_error = ?1, status = 'pending'
                 WHERE id = ?2",
                params![error, id],
            )?;
            ensure_found(id, changed)
        })
        .await
    }

    async fn delete(&self, id: QueueId) -> Result<(), CacheError> {
        self.blocking(move |conn| {
            conn.execute("DELETE FROM request_queue WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        self.blocking(|conn| {
            Ok(conn.execute("DELETE FROM request_queue WHERE status != 'completed'", [])?)
        })
        .await
    }

    async fn recover_in_flight(&self) -> Result<usize, CacheError> {
        let recovered = self
            .blocking(|conn| {
                Ok(conn.execute(
                    "UPDATE request_queue SET status = 'pending' WHERE status = 'syncing'",
                    [],
                )?)
            })
            .await?;
        if recovered > 0 {
            warn!(recovered, "returned interrupted queue records to pending");
        }
        Ok(recovered)
    }
}

const INSERT_SQL: &str = "INSERT INTO request_queue (
        entity_type, entity_id, operation, payload, priority, status, retry_count,
        created_at, expires_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6, ?7)";

const SELECT_PENDING_SQL: &str = "SELECT
        id, payload, priority, status, retry_count, last_error, created_at, expires_at,
        last_attempt_at
    FROM request_queue
    WHERE status = 'pending'
    ORDER BY priority DESC, created_at ASC, id ASC";

const SELECT_QUEUED_SQL: &str = "SELECT
        id, payload, priority, status, retry_count, last_error, created_at, expires_at,
        last_attempt_at
    FROM request_queue
    WHERE status IN ('pending', 'syncing')
    ORDER BY priority DESC, created_at ASC, id ASC";

fn insert_record(conn: &Connection, record: &NewQueuedRequest) -> Result<QueueId, InfraError> {
    let (entity_type, entity_id) = entity_of(&record.path);
    let payload = serde_json::to_string(&StoredPayload {
        method: record.method,
        path: record.path.clone(),
        headers: record.headers.clone(),
        body: record.body.clone(),
        request_id: record.request_id.clone(),
    })?;

    conn.execute(
        INSERT_SQL,
        params![
            entity_type,
            entity_id,
            record.method.as_str(),
            payload,
            record.priority.as_i64(),
            record.created_at.timestamp_millis(),
            record.expires_at.timestamp_millis(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Decode every row `sql` selects
///
/// A row that no longer decodes can never be replayed, so it is logged,
/// deleted and left out instead of failing the whole read.
fn load_records(conn: &Connection, sql: &str) -> Result<Vec<QueuedRequest>, InfraError> {
    let mut stmt = conn.prepare(sql)?;
    let decoded = stmt
        .query_map([], |row| Ok((row.get::<_, QueueId>(0)?, map_queue_row(row))))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(decoded.len());
    for (id, result) in decoded {
        match result {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(queue_id = id, error = %err, "undecodable queue record; discarding");
                conn.execute("DELETE FROM request_queue WHERE id = ?1", params![id])?;
            }
        }
    }
    Ok(records)
}

fn map_queue_row(row: &Row<'_>) -> rusqlite::Result<QueuedRequest> {
    let id: QueueId = row.get(0)?;
    let raw_payload: String = row.get(1)?;
    let payload: StoredPayload = serde_json::from_str(&raw_payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let status_raw: String = row.get(3)?;

    Ok(QueuedRequest {
        id,
        method: payload.method,
        path: payload.path,
        headers: payload.headers,
        body: payload.body,
        request_id: payload.request_id,
        priority: parse_priority(id, row.get(2)?),
        status: parse_status(id, &status_raw),
        retry_count: row.get(4)?,
        last_error: row.get(5)?,
        created_at: millis_to_utc(6, row.get(6)?)?,
        expires_at: millis_to_utc(7, row.get(7)?)?,
        last_attempt_at: row
            .get::<_, Option<i64>>(8)?
            .map(|millis| millis_to_utc(8, millis))
            .transpose()?,
    })
}

fn parse_priority(id: QueueId, raw: i64) -> Priority {
    Priority::try_from(raw).unwrap_or_else(|err| {
        warn!(queue_id = id, raw_priority = raw, error = %err, "invalid queue priority; defaulting to normal");
        Priority::Normal
    })
}

fn parse_status(id: QueueId, raw: &str) -> QueueStatus {
    raw.parse::<QueueStatus>().unwrap_or_else(|err| {
        warn!(queue_id = id, raw_status = %raw, error = %err, "invalid queue status; defaulting to pending");
        QueueStatus::Pending
    })
}

fn millis_to_utc(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, millis))
}

/// Resource name and id from a REST path, skipping `api` and version segments.
///
/// `/api/v1/orders/42/lines?x=1` yields `("orders", Some("42"))`.
fn entity_of(path: &str) -> (String, Option<String>) {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .skip_while(|segment| *segment == "api" || is_version_segment(segment));

    let entity_type = segments.next().unwrap_or("unknown").to_string();
    let entity_id = segments.next().map(str::to_string);
    (entity_type, entity_id)
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

fn ensure_found(id: QueueId, changed: usize) -> Result<(), InfraError> {
    if changed == 0 {
        return Err(CacheError::Corrupted(format!("queue record {id} not found")).into());
    }
    Ok(())
}

fn map_join_error(err: task::JoinError) -> CacheError {
    if err.is_cancelled() {
        CacheError::StorageUnavailable("queue task cancelled".into())
    } else {
        CacheError::StorageUnavailable(format!("queue task panic: {err}"))
    }
}
