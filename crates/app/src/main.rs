//! FieldLink - resilient request pipeline daemon
//!
//! Loads configuration, starts the pipeline context and keeps the offline
//! queue draining until interrupted.

use anyhow::{Context, Result};
use fieldlink_app::{init_tracing, PipelineContext};
use fieldlink_infra::ConfigLoader;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging settings live in the config, so load it before anything logs
    let config = ConfigLoader::new().load().context("failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "FieldLink starting");

    let mut ctx = PipelineContext::new_with_config(config).await?;

    let health = ctx.health_check().await;
    if !health.is_healthy {
        for component in health.components.iter().filter(|c| !c.is_healthy) {
            warn!(component = %component.name, message = ?component.message, "component unhealthy at startup");
        }
    }

    match ctx.pipeline.queue().get_stats().await {
        Ok(stats) => info!(pending = stats.pending, expired = stats.expired, "offline queue loaded"),
        Err(e) => warn!(error = %e, "could not read offline queue stats"),
    }

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    ctx.shutdown().await
}
