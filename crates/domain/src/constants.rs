//! Header names and pipeline defaults

/// Authorization header carrying `<scheme> <access token>`
pub const HEADER_AUTHORIZATION: &str = "Authorization";
/// Per-request correlation id (UUID)
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
/// Anti-forgery header sent on write methods only
pub const HEADER_CSRF_TOKEN: &str = "X-CSRF-Token";
/// Server hint for when to retry, integer seconds
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Default token scheme when the server omits one
pub const DEFAULT_TOKEN_SCHEME: &str = "Bearer";
/// Refresh this long before `expires_at`
pub const DEFAULT_REFRESH_WINDOW_SECS: u64 = 300;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;
/// Status codes worth retrying
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_QUEUE_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_QUEUE_MAX_RETRIES: u32 = 5;
pub const DEFAULT_REPLAY_INTERVAL_SECS: u64 = 30;

/// Status of the synthetic response returned for queued writes
pub const ACCEPTED_STATUS: u16 = 202;
