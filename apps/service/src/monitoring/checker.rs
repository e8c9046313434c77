use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use surge_ping::{Client, Config as PingConfig, ICMP, PingIdentifier, PingSequence, SurgeError};
use thiserror::Error;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

/// Why a single probe did not produce a round trip.
///
/// These are routine outcomes. The executor folds every variant into an
/// unreachable `ProbeOutcome`; none of them leaves the monitoring module.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("could not resolve {address}: {reason}")]
    Resolve { address: String, reason: String },

    #[error("{address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),
}

/// Transport used to reach targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMethod {
    /// ICMP echo request (needs raw or ping-group socket permissions)
    #[default]
    Icmp,
    /// TCP connect to a fixed port
    Tcp,
}

impl std::fmt::Display for CheckMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckMethod::Icmp => write!(f, "icmp"),
            CheckMethod::Tcp => write!(f, "tcp"),
        }
    }
}

impl std::str::FromStr for CheckMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "icmp" => Ok(CheckMethod::Icmp),
            "tcp" => Ok(CheckMethod::Tcp),
            other => Err(format!("unknown probe method `{other}` (expected icmp or tcp)")),
        }
    }
}

/// Checker trait for the network transports a probe can use
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Send one reachability request to `address` and return the round trip
    async fn check(&self, address: &str, timeout: Duration) -> Result<Duration, ProbeError>;
}

/// Resolve a hostname or literal IP to the first address the resolver returns
async fn resolve(address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = lookup_host((address, 0)).await.map_err(|e| ProbeError::Resolve {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    addrs.next().map(|sock| sock.ip()).ok_or_else(|| ProbeError::Resolve {
        address: address.to_string(),
        reason: "no addresses returned".to_string(),
    })
}

/// ICMP echo checker
pub struct IcmpChecker {
    payload: [u8; 56],
}

impl IcmpChecker {
    pub fn new() -> Self {
        Self { payload: [0; 56] }
    }
}

impl Default for IcmpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Checker for IcmpChecker {
    async fn check(&self, address: &str, timeout_duration: Duration) -> Result<Duration, ProbeError> {
        let ip = resolve(address).await?;

        let config = match ip {
            IpAddr::V4(_) => PingConfig::default(),
            IpAddr::V6(_) => PingConfig::builder().kind(ICMP::V6).build(),
        };
        // One socket per probe keeps a broken socket from poisoning later cycles.
        let client = Client::new(&config)?;

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout_duration);

        match pinger.ping(PingSequence(0), &self.payload).await {
            Ok((_packet, rtt)) => Ok(rtt),
            Err(SurgeError::Timeout { .. }) => Err(ProbeError::Timeout(timeout_duration)),
            Err(SurgeError::IOError(e)) => Err(ProbeError::Socket(e)),
            Err(e) => Err(ProbeError::Unreachable { address: address.to_string(), reason: e.to_string() }),
        }
    }
}

/// TCP port checker
pub struct TcpChecker {
    port: u16,
}

impl TcpChecker {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, address: &str, timeout_duration: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();

        let connect = TcpStream::connect((address, self.port));

        timeout(timeout_duration, connect)
            .await
            .map_err(|_| ProbeError::Timeout(timeout_duration))?
            .map_err(|e| ProbeError::Unreachable {
                address: format!("{address}:{}", self.port),
                reason: e.to_string(),
            })?;

        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_method_parsing() {
        assert_eq!("icmp".parse::<CheckMethod>().unwrap(), CheckMethod::Icmp);
        assert_eq!(" TCP ".parse::<CheckMethod>().unwrap(), CheckMethod::Tcp);
        assert!("http".parse::<CheckMethod>().is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal_ip() {
        let ip = resolve("192.0.2.10").await.unwrap();
        assert_eq!(ip, "192.0.2.10".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_invalid_hostname() {
        let result = resolve("no such host.invalid").await;
        assert!(matches!(result, Err(ProbeError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_tcp_check_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let checker = TcpChecker::new(port);
        let rtt = checker.check("127.0.0.1", Duration::from_secs(1)).await.unwrap();
        assert!(rtt < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tcp_check_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let checker = TcpChecker::new(port);
        let result = checker.check("127.0.0.1", Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
