//! Pipeline context - dependency injection container
//!
//! Builds every adapter from a [`PipelineConfig`], wires them into a
//! [`RequestPipeline`] and owns the background tasks (queue replay worker and
//! optional health polling) for the lifetime of the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fieldlink_common::SystemClock;
use fieldlink_core::{
    circuit_breaker_registry, ConnectivityProbe, OfflineQueue, RequestPipeline, RetryController,
    TokenLifecycleManager, TokenStore,
};
use fieldlink_domain::PipelineConfig;
use fieldlink_infra::{
    ConfigLoader, DbManager, HttpClient, HttpTokenRefresher, KeychainTokenStore, NetworkMonitor,
    QueueReplayWorker, ReplayWorkerConfig, ReqwestTransport, SqliteQueueStore,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::health::{ComponentHealth, HealthStatus};

/// How often the health endpoint is polled when one is configured
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Pipeline context - holds the pipeline and everything it depends on
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub db: Arc<DbManager>,
    pub monitor: NetworkMonitor,
    pub pipeline: Arc<RequestPipeline>,
    worker: QueueReplayWorker,
    health_cancel: CancellationToken,
    health_task: Option<JoinHandle<()>>,
}

impl PipelineContext {
    /// Load configuration (files, `.env`, environment) and build the context
    pub async fn new() -> Result<Self> {
        let config = ConfigLoader::new().load().context("failed to load configuration")?;
        Self::new_with_config(config).await
    }

    /// Build the context with tokens persisted in the platform keychain
    pub async fn new_with_config(config: PipelineConfig) -> Result<Self> {
        let store = Arc::new(KeychainTokenStore::new(config.auth.keychain_service.clone()));
        Self::with_token_store(config, store).await
    }

    /// Build the context around an explicit token store
    ///
    /// Tests use this to keep credentials out of the platform keychain.
    pub async fn with_token_store(config: PipelineConfig, token_store: Arc<dyn TokenStore>) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let db = Arc::new(DbManager::from_config(&config.database).with_context(|| {
            format!("failed to open queue database at {}", config.database.path)
        })?);

        // Assume online until the first probe or transport failure says otherwise
        let monitor = NetworkMonitor::new(true);
        let connectivity = Arc::new(monitor.clone());

        let queue = Arc::new(OfflineQueue::new(
            Arc::new(SqliteQueueStore::new(Arc::clone(&db))),
            connectivity.clone(),
            config.queue.clone(),
        ));
        let recovered = queue.recover_in_flight().await.context("failed to recover in-flight requests")?;
        if recovered > 0 {
            warn!(recovered, "requeued requests interrupted by a previous shutdown");
        }

        let client = HttpClient::from_config(&config.api).context("failed to build HTTP client")?;

        let tokens = TokenLifecycleManager::new(
            token_store,
            Arc::new(HttpTokenRefresher::new(client.clone(), config.api.refresh_path.clone())),
            config.auth.refresh_window,
        );
        let token_state = tokens.initialize().await.context("failed to load stored token")?;
        info!(?token_state, "token lifecycle initialized");

        let mut retry = RetryController::new(config.retry.clone(), connectivity.clone());
        if let Some(breakers) = circuit_breaker_registry(&config.circuit_breaker, Arc::new(SystemClock))
            .context("invalid circuit breaker settings")?
        {
            retry = retry.with_circuit_breakers(breakers);
        }

        let pipeline = Arc::new(RequestPipeline::new(
            tokens,
            Arc::new(retry),
            queue,
            Arc::new(ReqwestTransport::new(client.clone())),
            connectivity,
        ));

        let mut worker = QueueReplayWorker::new(
            pipeline.clone(),
            monitor.subscribe(),
            ReplayWorkerConfig::from(&config.queue),
        );
        worker.start().context("failed to start queue replay worker")?;

        let health_cancel = CancellationToken::new();
        let health_task = config.api.health_path.as_ref().map(|path| {
            monitor.spawn_health_polling(client, path.clone(), HEALTH_POLL_INTERVAL, health_cancel.clone())
        });

        info!(
            base_url = %config.api.base_url,
            health_polling = health_task.is_some(),
            "pipeline context ready"
        );

        Ok(Self { config, db, monitor, pipeline, worker, health_cancel, health_task })
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Snapshot of database, connectivity, session and worker health
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new().add_component(self.check_database_health().await);

        status = status.add_component(if self.monitor.is_online() {
            ComponentHealth::healthy("connectivity")
        } else {
            ComponentHealth::unhealthy("connectivity", "offline")
        });

        let tokens = self.pipeline.tokens();
        status = status.add_component(if tokens.is_authenticated().await {
            ComponentHealth::healthy("session")
        } else {
            ComponentHealth::unhealthy("session", format!("{:?}", tokens.state()))
        });

        status = status.add_component(match self.pipeline.queue().pending_count().await {
            Ok(pending) => ComponentHealth::healthy_with("queue", format!("{pending} pending")),
            Err(e) => ComponentHealth::unhealthy("queue", e.to_string()),
        });

        status = status.add_component(if self.worker.is_running() {
            ComponentHealth::healthy("replay_worker")
        } else {
            ComponentHealth::unhealthy("replay_worker", "not running")
        });

        status.calculate_score();
        status
    }

    async fn check_database_health(&self) -> ComponentHealth {
        let db = Arc::clone(&self.db);
        match tokio::task::spawn_blocking(move || db.health_check()).await {
            Ok(Ok(())) => ComponentHealth::healthy("database"),
            Ok(Err(e)) => {
                warn!(error = %e, "database health check failed");
                ComponentHealth::unhealthy("database", format!("query failed: {e}"))
            }
            Err(e) => {
                warn!(error = %e, "database health check task panicked");
                ComponentHealth::unhealthy("database", format!("task panic: {e}"))
            }
        }
    }

    /// Stop the replay worker and health polling
    ///
    /// Queued requests stay in the database and are replayed on next start.
    /// Calling this twice is harmless.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("shutting down pipeline context");

        self.health_cancel.cancel();
        if let Some(task) = self.health_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "health polling task ended abnormally");
            }
        }

        if self.worker.is_running() {
            self.worker.stop().await.context("failed to stop queue replay worker")?;
        }

        info!("pipeline context stopped");
        Ok(())
    }
}
