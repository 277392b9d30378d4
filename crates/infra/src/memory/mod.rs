//! Ephemeral stores for tests and sessions that must not touch disk

mod queue_store;
mod token_store;

pub use queue_store::InMemoryQueueStore;
pub use token_store::InMemoryTokenStore;
