//! Requests and responses as seen by the pipeline
//!
//! Bodies are opaque JSON; the pipeline never inspects payload shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::queue::{Priority, QueueId};
use crate::constants::{ACCEPTED_STATUS, HEADER_REQUEST_ID, HEADER_RETRY_AFTER};

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
}

impl HttpMethod {
    /// Repeating the request has the same effect as sending it once
    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            Self::Get | Self::Head | Self::Put | Self::Delete | Self::Options | Self::Trace
        )
    }

    /// Methods that change server state and are queued while offline
    pub fn is_write(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            _ => Err(format!("Invalid HttpMethod: {s}")),
        }
    }
}

/// Header map; lookups through [`header`] ignore case
pub type Headers = BTreeMap<String, String>;

fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn set_header(headers: &mut Headers, name: &str, value: String) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

/// An outgoing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Caller vouches that a non-idempotent request is safe to repeat
    #[serde(default)]
    pub retryable: bool,
    /// Send without credentials when no token is stored
    #[serde(default)]
    pub anonymous: bool,
    /// Queue priority if the request has to wait for connectivity
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Queue time-to-live override
    #[serde(default)]
    pub ttl: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: None,
            retryable: false,
            anonymous: false,
            priority: None,
            ttl: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value.into());
        self
    }

    pub fn mark_retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        set_header(&mut self.headers, name, value.into());
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(HEADER_REQUEST_ID)
    }

    /// Ensure an `X-Request-ID` header exists, returning its value
    pub fn ensure_request_id(&mut self) -> String {
        if let Some(existing) = self.request_id() {
            return existing.to_string();
        }
        let id = Uuid::new_v4().to_string();
        self.set_header(HEADER_REQUEST_ID, id.clone());
        id
    }

    /// May this request be repeated after a failure
    pub fn is_retry_safe(&self) -> bool {
        self.retryable || self.method.is_idempotent()
    }
}

/// A response, real or synthetic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn new(status: u16) -> Self {
        Self { status, headers: Headers::new(), body: None }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value.into());
        self
    }

    /// Synthetic acceptance for a write that was queued instead of sent
    pub fn accepted(queue_id: QueueId) -> Self {
        Self::new(ACCEPTED_STATUS)
            .with_body(serde_json::json!({ "queued": true, "queueId": queue_id }))
    }

    /// Queue id of a synthetic acceptance
    pub fn queue_id(&self) -> Option<QueueId> {
        if self.status != ACCEPTED_STATUS {
            return None;
        }
        self.body.as_ref()?.get("queueId")?.as_i64()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    /// `Retry-After` as integer seconds; HTTP-date values are ignored
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(self.header(HEADER_RETRY_AFTER)?)
    }
}

/// Parse an integer-seconds `Retry-After` value
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
