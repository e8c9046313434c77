//! Wiring shared by the headless service and the HTTP server.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::database::{LogStore, SqliteLogStore, StoreError};
use crate::monitoring::{MonitorLoop, MonitorSnapshot, ProbeExecutor};
use crate::retention::RetentionCleanup;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A running monitor loop plus its optional retention task
pub struct Monitoring {
    pub store: Arc<dyn LogStore>,
    pub status: watch::Receiver<MonitorSnapshot>,
    pub target_count: usize,
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
    retention: Option<JoinHandle<()>>,
}

impl Monitoring {
    /// Open the log and start probing with a validated `config`
    pub async fn start(config: &Config, cancel: CancellationToken) -> Result<Self, StartError> {
        let targets = config.targets()?;
        if targets.is_empty() {
            warn!("No targets configured; the monitor will idle until restarted with some");
        }

        let executor = ProbeExecutor::for_method(config.monitor.method, config.tcp_port(), config.timeout())?;

        let store: Arc<dyn LogStore> =
            Arc::new(SqliteLogStore::open(&config.database.path, config.database.pool_size).await?);

        let target_count = targets.len();
        let monitor = MonitorLoop::new(targets, executor, Arc::clone(&store), config.interval());
        let status = monitor.subscribe();

        info!(
            targets = target_count,
            interval_secs = config.monitor.interval_seconds,
            method = %config.monitor.method,
            database = %config.database.path.display(),
            "Starting monitor loop"
        );

        let monitor = monitor.spawn(cancel.clone());
        let retention =
            RetentionCleanup::new(Arc::clone(&store), config.retention).start_periodic_cleanup(cancel.clone());

        Ok(Self { store, status, target_count, cancel, monitor, retention })
    }

    /// Cancel the loop and wait for its current cycle to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();

        if let Err(e) = self.monitor.await {
            warn!(error = %e, "Monitor loop ended abnormally");
        }
        if let Some(retention) = self.retention {
            if let Err(e) = retention.await {
                warn!(error = %e, "Retention task ended abnormally");
            }
        }

        info!("Monitor stopped");
    }
}
