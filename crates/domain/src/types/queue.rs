//! Offline queue records

use chrono::{DateTime, Utc};
use fieldlink_common::impl_status_conversions;
use serde::{Deserialize, Serialize};

use super::request::{ApiRequest, Headers, HttpMethod};

/// Store-assigned identifier of a queued request
pub type QueueId = i64;

/// Replay priority; higher values are sent first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl_status_conversions!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Normal, Self::High, Self::Critical];

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for Priority {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            3 => Ok(Self::Critical),
            other => Err(format!("Invalid Priority: {other}")),
        }
    }
}

/// Lifecycle of a queued record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Syncing,
    Completed,
}

impl_status_conversions!(QueueStatus {
    Pending => "pending",
    Syncing => "syncing",
    Completed => "completed",
});

/// A write captured while offline, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    pub id: QueueId,
    pub method: HttpMethod,
    pub path: String,
    pub headers: Headers,
    pub body: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub status: QueueStatus,
}

impl QueuedRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Rebuild the request for replay. Queued writes were accepted on the
    /// caller's behalf, so replays are always treated as retry-safe.
    pub fn to_request(&self) -> ApiRequest {
        let mut request = ApiRequest::new(self.method, self.path.clone());
        request.headers = self.headers.clone();
        request.body = self.body.clone();
        request.priority = Some(self.priority);
        request.retryable = true;
        if let Some(request_id) = &self.request_id {
            request.set_header(crate::constants::HEADER_REQUEST_ID, request_id.clone());
        }
        request
    }
}

/// Insert payload; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueuedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Headers,
    pub body: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewQueuedRequest {
    /// Capture `request` for replay. Credentials are stripped; they are
    /// injected again at send time.
    pub fn from_request(
        request: &ApiRequest,
        priority: Priority,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let headers = request
            .headers
            .iter()
            .filter(|(name, _)| !is_credential_header(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            method: request.method,
            path: request.path.clone(),
            headers,
            body: request.body.clone(),
            request_id: request.request_id().map(str::to_string),
            priority,
            created_at,
            expires_at,
        }
    }

    /// Materialise the stored record once an id is known
    pub fn into_record(self, id: QueueId) -> QueuedRequest {
        QueuedRequest {
            id,
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
            request_id: self.request_id,
            priority: self.priority,
            created_at: self.created_at,
            expires_at: self.expires_at,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
            status: QueueStatus::Pending,
        }
    }
}

fn is_credential_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(crate::constants::HEADER_AUTHORIZATION)
        || name.eq_ignore_ascii_case(crate::constants::HEADER_CSRF_TOKEN)
}

/// Pending record counts per priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub critical: usize,
}

impl PriorityCounts {
    pub fn increment(&mut self, priority: Priority) {
        match priority {
            Priority::Low => self.low += 1,
            Priority::Normal => self.normal += 1,
            Priority::High => self.high += 1,
            Priority::Critical => self.critical += 1,
        }
    }

    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::Low => self.low,
            Priority::Normal => self.normal,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.normal + self.high + self.critical
    }
}

/// Queue snapshot for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub by_priority: PriorityCounts,
    pub pending: usize,
    /// Past TTL but not yet purged by a processing pass
    pub expired: usize,
}

impl QueueStats {
    pub fn from_records(records: &[QueuedRequest], now: DateTime<Utc>) -> Self {
        let mut stats = Self { pending: records.len(), ..Self::default() };
        for record in records {
            stats.by_priority.increment(record.priority);
            if record.is_expired(now) {
                stats.expired += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_and_values() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::Critical.as_i64(), 3);
        assert_eq!(Priority::try_from(0), Ok(Priority::Low));
        assert!(Priority::try_from(9).is_err());
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(QueueStatus::Syncing.to_string(), "syncing");
        assert_eq!("PENDING".parse::<QueueStatus>(), Ok(QueueStatus::Pending));
        assert_eq!("critical".parse::<Priority>(), Ok(Priority::Critical));
    }

    /// Validates capture of a request for offline replay.
    ///
    /// Assertions:
    /// - Ensures credentials are not persisted.
    /// - Ensures the request id and body survive into the replayed request.
    /// - Ensures replayed requests are retry-safe.
    #[test]
    fn test_capture_strips_credentials() {
        let now = Utc::now();
        let request = ApiRequest::post("/api/v1/orders", serde_json::json!({"sku": "A1"}))
            .with_header("Authorization", "Bearer secret")
            .with_header("X-CSRF-Token", "csrf")
            .with_header("X-Request-ID", "req-1")
            .with_header("Content-Language", "en");

        let record = NewQueuedRequest::from_request(
            &request,
            Priority::Critical,
            now,
            now + chrono::Duration::hours(24),
        )
        .into_record(7);

        assert!(!record.headers.keys().any(|k| k.eq_ignore_ascii_case("authorization")));
        assert!(!record.headers.keys().any(|k| k.eq_ignore_ascii_case("x-csrf-token")));
        assert_eq!(record.request_id.as_deref(), Some("req-1"));
        assert_eq!(record.status, QueueStatus::Pending);

        let replay = record.to_request();
        assert_eq!(replay.request_id(), Some("req-1"));
        assert_eq!(replay.header("content-language"), Some("en"));
        assert_eq!(replay.body, Some(serde_json::json!({"sku": "A1"})));
        assert!(replay.is_retry_safe());
    }

    #[test]
    fn test_stats_count_priorities_and_expired() {
        let now = Utc::now();
        let make = |id, priority, ttl_minutes| {
            NewQueuedRequest::from_request(
                &ApiRequest::delete("/api/v1/x"),
                priority,
                now - chrono::Duration::hours(1),
                now + chrono::Duration::minutes(ttl_minutes),
            )
            .into_record(id)
        };
        let records = vec![
            make(1, Priority::Low, 10),
            make(2, Priority::Critical, -5),
            make(3, Priority::Critical, 10),
        ];

        let stats = QueueStats::from_records(&records, now);

        assert_eq!(stats.pending, 3);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.by_priority.get(Priority::Critical), 2);
        assert_eq!(stats.by_priority.low, 1);
        assert_eq!(stats.by_priority.total(), 3);
    }
}
