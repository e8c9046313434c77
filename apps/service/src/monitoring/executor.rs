use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::debug;

use super::checker::{CheckMethod, Checker, IcmpChecker, ProbeError, TcpChecker};
use super::types::{ProbeOutcome, Target};
use crate::config::ConfigError;

/// Probe executor - turns one checker call into one `ProbeOutcome`.
///
/// `probe` never fails: every transport error, including a checker that
/// overruns its deadline, becomes an unreachable outcome.
#[derive(Clone)]
pub struct ProbeExecutor {
    checker: Arc<dyn Checker>,
    timeout: Duration,
}

impl ProbeExecutor {
    /// Create a new probe executor
    pub fn new(checker: Arc<dyn Checker>, timeout: Duration) -> Self {
        Self { checker, timeout }
    }

    /// Build the executor for a configured transport
    ///
    /// `tcp_port` is required for `Tcp` and ignored for `Icmp`.
    pub fn for_method(method: CheckMethod, tcp_port: Option<u16>, timeout: Duration) -> Result<Self, ConfigError> {
        let checker: Arc<dyn Checker> = match method {
            CheckMethod::Tcp => Arc::new(TcpChecker::new(tcp_port.ok_or(ConfigError::MissingTcpPort)?)),
            CheckMethod::Icmp => Arc::new(IcmpChecker::new()),
        };
        Ok(Self::new(checker, timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `target` with the configured timeout
    pub async fn probe(&self, target: &Target) -> ProbeOutcome {
        self.probe_with_timeout(target, self.timeout).await
    }

    /// Probe `target`, giving up after `limit`
    pub async fn probe_with_timeout(&self, target: &Target, limit: Duration) -> ProbeOutcome {
        let result = match timeout(limit, self.checker.check(&target.address, limit)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(limit)),
        };

        let observed_at = Utc::now();
        match result {
            Ok(rtt) => ProbeOutcome::reachable(target, rtt, observed_at),
            Err(e) => {
                debug!(target = %target.name, address = %target.address, error = %e, "Probe failed");
                ProbeOutcome::unreachable(target, observed_at)
            }
        }
    }
}
