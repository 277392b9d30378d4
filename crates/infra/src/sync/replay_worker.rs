//! Queue replay worker
//!
//! Drains the offline queue when connectivity returns and on a periodic
//! tick. Join handles are tracked and cancellation is explicit. A pass is
//! bounded by a timeout and abandoned as soon as the worker is stopped; the
//! next pass requeues whatever it left in flight.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldlink_core::RequestPipeline;
//! use fieldlink_infra::{NetworkMonitor, QueueReplayWorker, ReplayWorkerConfig};
//!
//! # async fn example(pipeline: Arc<RequestPipeline>) -> Result<(), fieldlink_infra::WorkerError> {
//! let monitor = NetworkMonitor::new(true);
//! let mut worker =
//!     QueueReplayWorker::new(pipeline, monitor.subscribe(), ReplayWorkerConfig::default());
//!
//! worker.start()?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldlink_common::time::Clock;
use fieldlink_core::{ProcessReport, RequestPipeline};
use fieldlink_domain::config::QueueConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::errors::WorkerError;

/// Something that can run one queue processing pass
#[async_trait]
pub trait QueueProcessor: Send + Sync + 'static {
    async fn process_queue(&self) -> ProcessReport;
}

#[async_trait]
impl<C: Clock> QueueProcessor for RequestPipeline<C> {
    async fn process_queue(&self) -> ProcessReport {
        RequestPipeline::process_queue(self).await
    }
}

/// Configuration for the replay worker.
#[derive(Debug, Clone)]
pub struct ReplayWorkerConfig {
    /// Interval between periodic passes
    pub replay_interval: Duration,
    /// Upper bound for a single pass
    pub processing_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for ReplayWorkerConfig {
    fn default() -> Self {
        Self {
            replay_interval: Duration::from_secs(60),
            processing_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&QueueConfig> for ReplayWorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self { replay_interval: config.replay_interval, ..Self::default() }
    }
}

/// Replay worker with explicit lifecycle management.
pub struct QueueReplayWorker {
    processor: Arc<dyn QueueProcessor>,
    online_rx: watch::Receiver<bool>,
    config: ReplayWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl QueueReplayWorker {
    pub fn new(
        processor: Arc<dyn QueueProcessor>,
        online_rx: watch::Receiver<bool>,
        config: ReplayWorkerConfig,
    ) -> Self {
        Self {
            processor,
            online_rx,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Spawn the background task. The first pass runs immediately.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();
        let handle = tokio::spawn(replay_loop(
            Arc::clone(&self.processor),
            self.online_rx.clone(),
            self.config.clone(),
            self.cancellation.clone(),
        ));

        self.task_handle = Some(handle);
        info!(interval_secs = self.config.replay_interval.as_secs(), "Queue replay worker started");
        Ok(())
    }

    /// Cancel the background task and wait for it to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), WorkerError> {
        let Some(handle) = self.task_handle.take() else {
            return Err(WorkerError::NotRunning);
        };

        self.cancellation.cancel();
        let join_timeout = self.config.join_timeout;
        match tokio::time::timeout(join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Replay worker task panicked");
                return Err(WorkerError::Panicked(e.to_string()));
            }
            Err(_) => {
                warn!("Replay worker task did not complete within timeout");
                return Err(WorkerError::JoinTimeout(join_timeout));
            }
        }

        info!("Queue replay worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }
}

async fn replay_loop(
    processor: Arc<dyn QueueProcessor>,
    mut online_rx: watch::Receiver<bool>,
    config: ReplayWorkerConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.replay_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_online = *online_rx.borrow_and_update();
    let mut watching = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Replay loop cancelled");
                break;
            }
            changed = online_rx.changed(), if watching => {
                if changed.is_err() {
                    debug!("Connectivity channel closed; continuing on interval only");
                    watching = false;
                    continue;
                }
                let online = *online_rx.borrow_and_update();
                if online && !was_online {
                    run_pass(processor.as_ref(), &config, &cancel, "reconnected").await;
                }
                was_online = online;
            }
            _ = ticker.tick() => {
                run_pass(processor.as_ref(), &config, &cancel, "interval").await;
            }
        }
    }
}

async fn run_pass(
    processor: &dyn QueueProcessor,
    config: &ReplayWorkerConfig,
    cancel: &CancellationToken,
    trigger: &'static str,
) {
    let timeout = config.processing_timeout;
    let outcome = tokio::select! {
        () = cancel.cancelled() => {
            debug!(trigger, "Replay pass abandoned on shutdown");
            return;
        }
        outcome = tokio::time::timeout(timeout, processor.process_queue()) => outcome,
    };

    match outcome {
        Ok(report) if report.skipped.is_some() => {
            debug!(trigger, reason = ?report.skipped, "Replay pass skipped");
        }
        Ok(report) => {
            info!(
                trigger,
                sent = report.sent,
                failed = report.failed,
                discarded_expired = report.discarded_expired,
                discarded_exhausted = report.discarded_exhausted,
                interrupted = report.interrupted,
                "Replay pass finished"
            );
        }
        Err(_) => {
            warn!(trigger, timeout_secs = timeout.as_secs(), "Replay pass timed out");
        }
    }
}

impl Drop for QueueReplayWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("QueueReplayWorker dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
