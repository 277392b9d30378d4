//! Coalesce concurrent calls into one in-flight operation
//!
//! A [`SingleFlight`] holds at most one in-progress future. Callers that
//! arrive while it is running attach to it and receive a clone of its
//! result instead of starting their own.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::trace;

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Guarded slot for a single shared in-flight operation
pub struct SingleFlight<T, E>
where
    T: Clone,
    E: Clone,
{
    slot: Mutex<Option<(u64, Flight<T, E>)>>,
    generation: AtomicU64,
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { slot: Mutex::new(None), generation: AtomicU64::new(0) }
    }

    /// Whether an operation is currently running
    pub fn is_in_flight(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|(_, flight)| flight.peek().is_none())
    }

    /// Run `start()` unless an operation is already in flight, in which case
    /// wait for that one instead
    ///
    /// `start` is only invoked by the caller that wins the slot. The slot is
    /// cleared as soon as the first waiter observes completion, so the next
    /// call after that starts a fresh operation.
    pub async fn run<F, Fut>(&self, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (id, flight) = self.join_or_start(start);
        let result = flight.await;
        self.finish(id);
        result
    }

    fn join_or_start<F, Fut>(&self, start: F) -> (u64, Flight<T, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some((id, flight)) = slot.as_ref() {
            if flight.peek().is_none() {
                trace!(flight_id = id, "Joining in-flight operation");
                return (*id, flight.clone());
            }
        }

        let id = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let flight = start().boxed().shared();
        *slot = Some((id, flight.clone()));
        trace!(flight_id = id, "Started new operation");
        (id, flight)
    }

    fn finish(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
    }
}
