use std::num::NonZeroUsize;
use std::sync::Arc;

use sentinel_service::LogStore;
use sentinel_service::monitoring::MonitorSnapshot;
use tokio::sync::watch;

/// Shared by every worker; the store is the only thing handlers touch
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LogStore>,
    pub status: watch::Receiver<MonitorSnapshot>,
    pub target_count: usize,
    pub history_limit: NonZeroUsize,
}
