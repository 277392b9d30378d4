//! One-shot timers with cancellation support

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::sleep;

/// A handle to a scheduled timer
///
/// Dropping the handle does not cancel the timer; call [`TimerHandle::cancel`].
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl TimerHandle {
    /// Cancel the timer. A callback that already started keeps running to
    /// its next await point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the timer task has completed, fired or not
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Run `task` once after `delay` on the current tokio runtime
///
/// # Panics
///
/// Panics if called outside a tokio runtime, like `tokio::spawn`.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use fieldlink_common::time::timer::schedule;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = schedule(Duration::from_secs(5), async {
///         println!("fired");
///     });
///     handle.cancel();
/// }
/// ```
pub fn schedule<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let join = tokio::spawn(async move {
        sleep(delay).await;
        if !flag.load(Ordering::SeqCst) {
            task.await;
        }
    });

    TimerHandle { cancelled, abort: join.abort_handle() }
}
