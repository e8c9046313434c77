use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::config::ConfigError;

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// Human label, unique within the configuration
    pub name: String,
    /// Hostname or IP address
    pub address: String,
}

impl Target {
    /// Build a target, rejecting blank fields
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into().trim().to_string();
        let address = address.into().trim().to_string();

        if name.is_empty() {
            return Err(ConfigError::EmptyTargetField { target: address, field: "name" });
        }
        if address.is_empty() {
            return Err(ConfigError::EmptyTargetField { target: name, field: "address" });
        }

        Ok(Self { name, address })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Result of one probe of one target
///
/// Fields are private: the two constructors are the only way to build an
/// outcome, which keeps `latency_ms` present exactly when the target was
/// reachable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    target_name: String,
    target_address: String,
    reachable: bool,
    latency_ms: Option<f64>,
    #[serde(serialize_with = "serialize_millis")]
    observed_at: DateTime<Utc>,
}

impl ProbeOutcome {
    /// The target answered after `rtt`
    ///
    /// Latency is stored in milliseconds, rounded to two decimals, so it is
    /// always finite and non-negative.
    pub fn reachable(target: &Target, rtt: Duration, observed_at: DateTime<Utc>) -> Self {
        Self {
            target_name: target.name.clone(),
            target_address: target.address.clone(),
            reachable: true,
            latency_ms: Some(round_latency(rtt)),
            observed_at,
        }
    }

    /// The target did not answer (timeout, DNS failure, refused, internal fault)
    pub fn unreachable(target: &Target, observed_at: DateTime<Utc>) -> Self {
        Self {
            target_name: target.name.clone(),
            target_address: target.address.clone(),
            reachable: false,
            latency_ms: None,
            observed_at,
        }
    }

    /// Rebuild an outcome from persisted columns.
    ///
    /// Returns `None` when the columns break the reachable/latency pairing
    /// or hold a latency no probe could have measured.
    pub(crate) fn from_parts(
        target_name: String,
        target_address: String,
        reachable: bool,
        latency_ms: Option<f64>,
        observed_at: DateTime<Utc>,
    ) -> Option<Self> {
        if reachable != latency_ms.is_some() {
            return None;
        }
        if latency_ms.is_some_and(|ms| !ms.is_finite() || ms < 0.0) {
            return None;
        }
        Some(Self { target_name, target_address, reachable, latency_ms, observed_at })
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target_address(&self) -> &str {
        &self.target_address
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Move `observed_at` forward to `floor` if it is earlier
    pub(crate) fn not_before(&mut self, floor: DateTime<Utc>) {
        if self.observed_at < floor {
            self.observed_at = floor;
        }
    }
}

/// Milliseconds rounded to two decimals
pub fn round_latency(rtt: Duration) -> f64 {
    (rtt.as_nanos() as f64 / 10_000.0).round() / 100.0
}

/// A probe outcome as stored in the log, with its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub id: i64,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

fn serialize_millis<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}
