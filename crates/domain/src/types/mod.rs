//! Value types shared by every layer

pub mod queue;
pub mod request;
pub mod retry;
pub mod token;

pub use queue::{
    NewQueuedRequest, Priority, PriorityCounts, QueueId, QueueStats, QueueStatus, QueuedRequest,
};
pub use request::{parse_retry_after, ApiRequest, ApiResponse, Headers, HttpMethod};
pub use retry::RetryContext;
pub use token::{Token, TokenState};
