//! Transport collaborators
//!
//! The node talks through two stacked layers: a network link and a
//! publish/subscribe session on top of it. Both are traits so the connection
//! manager can be driven by the host implementations here or by the mocks in
//! [`crate::testing`].

use async_trait::async_trait;
use std::net::IpAddr;

pub mod link;
pub mod mqtt;
pub mod probe;

pub use link::HostLink;
pub use probe::{ReachabilityProbe, TcpProbe};

/// Link status as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Network link collaborator
#[async_trait]
pub trait NetworkLink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start joining the network; progress is observed through [`status`]
    ///
    /// [`status`]: NetworkLink::status
    async fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    fn status(&self) -> LinkStatus;

    fn local_address(&self) -> Option<IpAddr>;

    /// Name of the joined network, reported in every envelope
    fn ssid(&self) -> String;
}

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe session collaborator
#[async_trait]
pub trait MessagingSession: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Perform the session handshake using `client_token` as client ID
    async fn connect(&mut self, client_token: &str) -> Result<(), Self::Error>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Service the session once and return the messages buffered so far,
    /// without waiting for new ones
    async fn service_once(&mut self) -> Result<Vec<InboundMessage>, Self::Error>;

    fn is_connected(&self) -> bool;
}
