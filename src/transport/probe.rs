//! Broker reachability probe
//!
//! Run once after every successful session handshake. The result is logged
//! only; it never changes the connection state.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Liveness check against the broker endpoint
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `true` when at least one attempt reached the endpoint
    async fn probe(&self, host: &str, port: u16) -> bool;
}

/// TCP connect probe, the host stand-in for an ICMP ping
#[derive(Debug, Clone)]
pub struct TcpProbe {
    attempts: u32,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(attempts: u32, timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, host: &str, port: u16) -> bool {
        for attempt in 1..=self.attempts {
            match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!("Probe attempt {} to {}:{} failed: {}", attempt, host, port, e),
                Err(_) => debug!("Probe attempt {} to {}:{} timed out", attempt, host, port),
            }
        }
        false
    }
}
