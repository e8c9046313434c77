//! Optional pruning of old probe records.
//!
//! The log is append-only from the monitor's point of view. When a
//! retention window is configured, a background task deletes records older
//! than that window once an hour. With no window configured nothing is
//! ever deleted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::{LogStore, StoreError};

/// How often the periodic cleanup runs
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Retention policy for probe records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Days to keep records; `None` keeps them forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

impl RetentionPolicy {
    pub fn keep_days(days: u32) -> Self {
        Self { days: Some(days) }
    }

    /// Retention window, if any
    fn window(&self) -> Option<chrono::Duration> {
        self.days.map(|days| chrono::Duration::days(i64::from(days)))
    }

    pub fn is_enabled(&self) -> bool {
        self.days.is_some()
    }
}

/// Cleanup manager for expired records
pub struct RetentionCleanup {
    store: Arc<dyn LogStore>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    /// Create a new retention cleanup manager
    pub fn new(store: Arc<dyn LogStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Delete everything older than the retention window
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let Some(window) = self.policy.window() else {
            return Ok(0);
        };

        let cutoff = Utc::now() - window;
        debug!(%cutoff, "Starting retention cleanup");

        let deleted = self.store.prune_before(cutoff).await?;
        if deleted > 0 {
            info!("Retention cleanup completed: {} probe records deleted", deleted);
        }
        Ok(deleted)
    }

    /// Start background cleanup task (runs every hour until cancelled)
    ///
    /// Returns `None` when the policy keeps everything.
    pub fn start_periodic_cleanup(self, cancel: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
        if !self.policy.is_enabled() {
            debug!("Retention disabled, keeping all probe records");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Retention cleanup stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.cleanup_expired().await {
                            warn!("Periodic retention cleanup failed: {}", e);
                        }
                    }
                }
            }
        }))
    }
}
