//! Durable offline queue
//!
//! Captures writes issued while offline and replays them, one at a time, in
//! priority-then-age order once connectivity returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fieldlink_common::time::{Clock, SystemClock};
use fieldlink_domain::{
    ApiRequest, NewQueuedRequest, Priority, QueueConfig, QueueError, QueueId, QueueStats,
    QueueStatus, QueuedRequest,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::ports::{QueueStore, ReplayDispatcher};
use super::priority::derive_priority;
use crate::transport_ports::ConnectivityProbe;

/// Why a processing pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
}

/// Outcome of one processing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub sent: usize,
    pub failed: usize,
    pub discarded_expired: usize,
    pub discarded_exhausted: usize,
    /// Set when the pass returned without looking at the queue
    pub skipped: Option<SkipReason>,
    /// The pass stopped early on a storage error or lost connectivity
    pub interrupted: bool,
}

impl ProcessReport {
    fn skipped(reason: SkipReason) -> Self {
        Self { skipped: Some(reason), ..Self::default() }
    }
}

/// Clears the processing flag when a pass ends, however it ends
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Offline write queue over a [`QueueStore`]
pub struct OfflineQueue<C: Clock = SystemClock> {
    store: Arc<dyn QueueStore>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<C>,
    config: QueueConfig,
    /// Serialises the capacity check with the insert
    enqueue_lock: Mutex<()>,
    processing: AtomicBool,
}

impl OfflineQueue<SystemClock> {
    pub fn new(
        store: Arc<dyn QueueStore>,
        connectivity: Arc<dyn ConnectivityProbe>,
        config: QueueConfig,
    ) -> Self {
        Self::with_clock(store, connectivity, config, Arc::new(SystemClock))
    }
}

impl<C: Clock> OfflineQueue<C> {
    pub fn with_clock(
        store: Arc<dyn QueueStore>,
        connectivity: Arc<dyn ConnectivityProbe>,
        config: QueueConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            store,
            connectivity,
            clock,
            config,
            enqueue_lock: Mutex::new(()),
            processing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Persist `request` for later delivery
    ///
    /// `priority` and `ttl` fall back to the request's own hints, then to
    /// the path-derived priority and the configured TTL.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn enqueue(
        &self,
        request: &ApiRequest,
        priority: Option<Priority>,
        ttl: Option<Duration>,
    ) -> Result<QueueId, QueueError> {
        let priority = priority
            .or(request.priority)
            .unwrap_or_else(|| derive_priority(&request.path));
        let ttl = ttl.or(request.ttl).unwrap_or(self.config.default_ttl);
        let created_at = self.clock.now_utc();
        let expires_at = created_at
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));

        let _slot = self.enqueue_lock.lock().await;
        let pending = self.store.count_pending().await?;
        if pending >= self.config.capacity {
            warn!(pending, capacity = self.config.capacity, "Offline queue full, rejecting write");
            return Err(QueueError::QueueFull { capacity: self.config.capacity });
        }

        let record = NewQueuedRequest::from_request(request, priority, created_at, expires_at);
        let id = self.store.insert(record).await?;
        info!(queue_id = id, %priority, "Queued write for replay");
        Ok(id)
    }

    /// Replay pending records through `dispatcher`
    ///
    /// Returns immediately when offline or when another pass is running.
    /// Records a dropped or failed earlier pass left in `Syncing` are
    /// returned to `Pending` first. Expired and exhausted records are
    /// deleted unsent; the rest are sent highest priority first, oldest
    /// first within a priority.
    #[instrument(skip_all)]
    pub async fn process_queue(&self, dispatcher: &dyn ReplayDispatcher) -> ProcessReport {
        if !self.connectivity.is_online() {
            debug!("Offline, skipping queue processing");
            return ProcessReport::skipped(SkipReason::Offline);
        }
        let Some(_pass) = PassGuard::acquire(&self.processing) else {
            debug!("Queue processing already running");
            return ProcessReport::skipped(SkipReason::AlreadyRunning);
        };

        let mut report = ProcessReport::default();
        // No other pass can hold a record in `Syncing` while this guard lives
        if let Err(e) = self.recover_in_flight().await {
            error!(error = %e, "Failed to requeue interrupted queue records");
            report.interrupted = true;
            return report;
        }

        let records = match self.store.list_pending().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to load pending queue records");
                report.interrupted = true;
                return report;
            }
        };

        let live = match self.purge(records, &mut report).await {
            Ok(live) => live,
            Err(e) => {
                error!(error = %e, "Failed to purge stale queue records");
                report.interrupted = true;
                return report;
            }
        };

        for record in live {
            if !self.connectivity.is_online() {
                info!("Connectivity lost, pausing replay");
                report.interrupted = true;
                break;
            }
            if let Err(e) = self.replay(&record, dispatcher, &mut report).await {
                error!(queue_id = record.id, error = %e, "Queue storage failed during replay");
                report.interrupted = true;
                break;
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            expired = report.discarded_expired,
            exhausted = report.discarded_exhausted,
            "Queue processing pass finished"
        );
        report
    }

    /// Number of records delivered by one pass
    pub async fn process_queue_count(&self, dispatcher: &dyn ReplayDispatcher) -> usize {
        self.process_queue(dispatcher).await.sent
    }

    /// Counts by priority, plus records already past their TTL
    ///
    /// Records being sent, or stranded by an interrupted pass, still count.
    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let records = self.store.list_queued().await?;
        Ok(QueueStats::from_records(&records, self.clock.now_utc()))
    }

    pub async fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.store.count_pending().await?)
    }

    /// Drop every queued record
    #[instrument(skip(self))]
    pub async fn clear_queue(&self) -> Result<usize, QueueError> {
        let removed = self.store.clear().await?;
        info!(removed, "Offline queue cleared");
        Ok(removed)
    }

    /// Return records stranded in `Syncing` by a crash to `Pending`
    pub async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let recovered = self.store.recover_in_flight().await?;
        if recovered > 0 {
            warn!(recovered, "Recovered queue records interrupted mid-replay");
        }
        Ok(recovered)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Delete expired and exhausted records; return the rest in send order
    async fn purge(
        &self,
        records: Vec<QueuedRequest>,
        report: &mut ProcessReport,
    ) -> Result<Vec<QueuedRequest>, QueueError> {
        let now = self.clock.now_utc();
        let mut live = Vec::with_capacity(records.len());

        for record in records {
            if record.is_expired(now) {
                self.store.delete(record.id).await?;
                report.discarded_expired += 1;
                let dropped = QueueError::Expired { id: record.id };
                info!(queue_id = record.id, path = %record.path, "{dropped}");
            } else if record.is_exhausted(self.config.max_retries) {
                self.store.delete(record.id).await?;
                report.discarded_exhausted += 1;
                let dropped =
                    QueueError::RetriesExhausted { id: record.id, attempts: record.retry_count };
                warn!(
                    queue_id = record.id,
                    path = %record.path,
                    last_error = record.last_error.as_deref().unwrap_or(""),
                    "{dropped}"
                );
            } else {
                live.push(record);
            }
        }

        live.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(live)
    }

    async fn replay(
        &self,
        record: &QueuedRequest,
        dispatcher: &dyn ReplayDispatcher,
        report: &mut ProcessReport,
    ) -> Result<(), QueueError> {
        self.store.update_status(record.id, QueueStatus::Syncing, self.clock.now_utc()).await?;
        debug!(queue_id = record.id, priority = %record.priority, "Replaying queued request");

        match dispatcher.dispatch(record.to_request()).await {
            Ok(response) => {
                self.store
                    .update_status(record.id, QueueStatus::Completed, self.clock.now_utc())
                    .await?;
                self.store.delete(record.id).await?;
                report.sent += 1;
                info!(queue_id = record.id, status = response.status, "Queued request delivered");
            }
            Err(e) => {
                self.store.record_failure(record.id, &e.to_string()).await?;
                report.failed += 1;
                warn!(
                    queue_id = record.id,
                    retry_count = record.retry_count + 1,
                    error = %e,
                    "Queued request failed, will retry on next pass"
                );
            }
        }
        Ok(())
    }
}
