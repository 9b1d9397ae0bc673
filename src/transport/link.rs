//! Host network link
//!
//! A host is already attached to its network, so "joining" means resolving
//! the broker and confirming the kernel has a route to it. The configured
//! SSID is only reported, never used to associate.

use super::{LinkStatus, NetworkLink};
use crate::error::LinkError;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a successful route check is trusted before it is repeated
const ROUTE_RECHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of the last route check
#[derive(Debug, Clone, Copy)]
struct RouteCheck {
    local: Option<IpAddr>,
    checked_at: Instant,
}

/// Network link for hosts with an existing network interface
#[derive(Debug)]
pub struct HostLink {
    ssid: String,
    broker_host: String,
    broker_port: u16,
    broker_addr: Option<SocketAddr>,
    route: Mutex<Option<RouteCheck>>,
}

impl HostLink {
    pub fn new(ssid: impl Into<String>, broker_host: impl Into<String>, broker_port: u16) -> Self {
        Self {
            ssid: ssid.into(),
            broker_host: broker_host.into(),
            broker_port,
            broker_addr: None,
            route: Mutex::new(None),
        }
    }

    /// Local address the kernel would use to reach `target`; no packet is sent
    fn route_to(target: SocketAddr) -> std::io::Result<IpAddr> {
        let bind_addr: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse().map_err(std::io::Error::other)?
        } else {
            "[::]:0".parse().map_err(std::io::Error::other)?
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(target)?;
        Ok(socket.local_addr()?.ip())
    }

    /// Cached route to the broker; a failed check is repeated on every call
    fn current_route(&self) -> Option<IpAddr> {
        let target = self.broker_addr?;
        let mut route = self.route.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(check) = *route {
            if check.local.is_some() && check.checked_at.elapsed() < ROUTE_RECHECK_INTERVAL {
                return check.local;
            }
        }

        let local = Self::route_to(target).ok();
        *route = Some(RouteCheck {
            local,
            checked_at: Instant::now(),
        });
        local
    }
}

#[async_trait]
impl NetworkLink for HostLink {
    type Error = LinkError;

    async fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), Self::Error> {
        self.ssid = ssid.to_string();
        let endpoint = format!("{}:{}", self.broker_host, self.broker_port);

        let addr = tokio::net::lookup_host(&endpoint)
            .await
            .map_err(|_| LinkError::Resolution(endpoint.clone()))?
            .next()
            .ok_or_else(|| LinkError::Resolution(endpoint.clone()))?;

        let local = Self::route_to(addr).map_err(|e| LinkError::JoinFailed {
            ssid: self.ssid.clone(),
            reason: e.to_string(),
        })?;

        debug!("Broker {} resolved to {} via {}", endpoint, addr, local);
        self.broker_addr = Some(addr);
        *self.route.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(RouteCheck {
            local: Some(local),
            checked_at: Instant::now(),
        });
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        match self.current_route() {
            Some(_) => LinkStatus::Connected,
            None => LinkStatus::Disconnected,
        }
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.current_route()
    }

    fn ssid(&self) -> String {
        self.ssid.clone()
    }
}
