//! Online/offline tracking
//!
//! [`NetworkMonitor`] is the pipeline's [`ConnectivityProbe`]. The state is
//! pushed by the host application (OS reachability callbacks) or, optionally,
//! by polling a lightweight health endpoint. Transitions are broadcast on a
//! `watch` channel so the replay worker can drain the queue as soon as the
//! device comes back online.

use std::sync::Arc;
use std::time::Duration;

use fieldlink_core::ConnectivityProbe;
use fieldlink_domain::HttpMethod;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::HttpClient;

/// Shared connectivity state; clones observe the same flag
#[derive(Clone)]
pub struct NetworkMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state: Arc::new(state) }
    }

    /// Record the current connectivity. Returns `true` if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Probe `health_path` every `interval` until `cancel` fires.
    ///
    /// Any HTTP answer counts as online; connection failures and timeouts
    /// count as offline.
    pub fn spawn_health_polling(
        &self,
        client: HttpClient,
        health_path: impl Into<String>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        let health_path = health_path.into();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Health polling cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let online = probe(&client, &health_path).await;
                        monitor.set_online(online);
                    }
                }
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for NetworkMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }
}

async fn probe(client: &HttpClient, health_path: &str) -> bool {
    let builder = match client.request(HttpMethod::Get, health_path) {
        Ok(builder) => builder,
        Err(e) => {
            warn!(error = %e, "Invalid health endpoint");
            return false;
        }
    };
    match client.execute(builder).await {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "Health probe failed");
            false
        }
    }
}
