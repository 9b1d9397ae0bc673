//! Connection management
//!
//! Owns the link and the session and drives both through
//! `Disconnected -> LinkUp -> SessionUp`. Every failure is retried without
//! limit; the only way out of [`ConnectionManager::ensure_connected`] is a
//! live session.

use crate::config::{NodeConfig, RetrySection};
use crate::connection_span;
use crate::error::SessionError;
use crate::identity::DeviceIdentity;
use crate::protocol::TopicNamespace;
use crate::time::Sleeper;
use crate::transport::mqtt::BrokerEndpoint;
use crate::transport::{
    InboundMessage, LinkStatus, MessagingSession, NetworkLink, ReachabilityProbe,
};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Connection state, re-derived from the collaborators on every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    LinkUp,
    SessionUp,
}

/// Wait between retry attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay used once the pattern is exhausted
    pub sustained_delay_ms: u64,
}

impl RetryPolicy {
    /// Same delay before every attempt
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            backoff_pattern: Vec::new(),
            sustained_delay_ms: delay_ms,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay_ms);
        Duration::from_millis(millis)
    }

    /// Link polling uses the fixed link delay
    pub fn link_from(retry: &RetrySection) -> Self {
        Self::fixed(retry.link_delay_ms)
    }

    /// Session retries walk the optional pattern, then settle on the session delay
    pub fn session_from(retry: &RetrySection) -> Self {
        Self {
            backoff_pattern: retry.backoff_pattern_ms.clone(),
            sustained_delay_ms: retry.session_delay_ms,
        }
    }
}

/// Everything the manager needs to (re)establish connectivity
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Identity token, used as the session client ID
    pub client_token: String,
    pub ssid: String,
    pub password: String,
    /// Issued in order on every transition to `SessionUp`
    pub subscriptions: Vec<String>,
    pub broker_host: String,
    pub broker_port: u16,
    pub link_retry: RetryPolicy,
    pub session_retry: RetryPolicy,
}

impl ConnectionSettings {
    pub fn from_config(
        config: &NodeConfig,
        identity: &DeviceIdentity,
        topics: &TopicNamespace,
        wifi_password: String,
    ) -> Result<Self, SessionError> {
        let endpoint = BrokerEndpoint::parse(&config.mqtt.broker_url)?;
        Ok(Self {
            client_token: identity.as_str().to_string(),
            ssid: config.wifi.ssid.clone(),
            password: wifi_password,
            subscriptions: topics.subscriptions(&config.mqtt.diagnostic_topics),
            broker_host: endpoint.host,
            broker_port: endpoint.port,
            link_retry: RetryPolicy::link_from(&config.retry),
            session_retry: RetryPolicy::session_from(&config.retry),
        })
    }
}

/// Brings the link and session up and guards every use of the session
pub struct ConnectionManager<L, S> {
    link: L,
    session: S,
    sleeper: Box<dyn Sleeper>,
    probe: Option<Box<dyn ReachabilityProbe>>,
    settings: ConnectionSettings,
    state: ConnectionState,
}

impl<L, S> ConnectionManager<L, S>
where
    L: NetworkLink,
    S: MessagingSession,
    S::Error: Into<SessionError>,
{
    pub fn new(
        link: L,
        session: S,
        sleeper: Box<dyn Sleeper>,
        probe: Option<Box<dyn ReachabilityProbe>>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            link,
            session,
            sleeper,
            probe,
            settings,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Mutable access for tests that script collaborator failures
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Re-derive the state from the collaborators
    pub fn refresh_state(&mut self) -> ConnectionState {
        self.state = match (self.link.status(), self.session.is_connected()) {
            (LinkStatus::Connected, true) => ConnectionState::SessionUp,
            (LinkStatus::Connected, false) => ConnectionState::LinkUp,
            (LinkStatus::Disconnected, _) => ConnectionState::Disconnected,
        };
        self.state
    }

    /// Wait until the session is up; a no-op when it already is
    pub async fn ensure_connected(&mut self) -> ConnectionState {
        if self.refresh_state() == ConnectionState::SessionUp {
            return self.state;
        }

        let span = connection_span!(client = %self.settings.client_token);
        self.establish().instrument(span).await;
        self.state
    }

    async fn establish(&mut self) {
        let mut session_attempt = 0u32;

        loop {
            if self.link.status() != LinkStatus::Connected {
                self.join_link().await;
            }
            self.state = ConnectionState::LinkUp;

            info!(
                broker = %self.settings.broker_host,
                port = self.settings.broker_port,
                "Attempting session handshake"
            );
            match self.session.connect(&self.settings.client_token).await {
                Ok(()) => break,
                Err(e) => {
                    session_attempt += 1;
                    let delay = self.settings.session_retry.delay_for(session_attempt);
                    warn!(
                        attempt = session_attempt,
                        error = %e,
                        "Session handshake failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        self.state = ConnectionState::SessionUp;
        info!("Session established");

        self.run_probe().await;
        self.resubscribe().await;
    }

    /// Join the network and poll its status until connected
    async fn join_link(&mut self) {
        self.state = ConnectionState::Disconnected;
        info!(ssid = %self.settings.ssid, "Joining network");

        let mut join_requested = false;
        let mut attempt = 0u32;
        loop {
            if !join_requested {
                match self
                    .link
                    .connect(&self.settings.ssid, &self.settings.password)
                    .await
                {
                    Ok(()) => join_requested = true,
                    Err(e) => warn!(error = %e, "Network join request failed"),
                }
            }

            if self.link.status() == LinkStatus::Connected {
                break;
            }

            attempt += 1;
            debug!(attempt, "Link not up yet");
            self.sleeper
                .sleep(self.settings.link_retry.delay_for(attempt))
                .await;
        }

        match self.link.local_address() {
            Some(address) => info!(%address, "Network connected"),
            None => info!("Network connected"),
        }
    }

    async fn run_probe(&self) {
        let Some(probe) = &self.probe else {
            return;
        };

        let host = &self.settings.broker_host;
        if probe.probe(host, self.settings.broker_port).await {
            info!(broker = %host, "Broker reachable");
        } else {
            warn!(broker = %host, "Broker probe failed");
        }
    }

    async fn resubscribe(&mut self) {
        for topic in &self.settings.subscriptions {
            match self.session.subscribe(topic).await {
                Ok(()) => debug!(%topic, "Subscribed"),
                Err(e) => {
                    let error: SessionError = e.into();
                    warn!(%topic, error = %error, "Subscription failed");
                }
            }
        }
    }

    fn require_session(&self) -> Result<(), SessionError> {
        if self.state == ConnectionState::SessionUp {
            Ok(())
        } else {
            Err(SessionError::NotConnected { state: self.state })
        }
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        self.require_session()?;
        self.session.publish(topic, payload).await.map_err(Into::into)
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        self.require_session()?;
        self.session.subscribe(topic).await.map_err(Into::into)
    }

    /// Service the session and return what arrived; a lost session is logged
    /// and reflected in the state, never surfaced as an error
    pub async fn service_once(&mut self) -> Vec<InboundMessage> {
        if self.state != ConnectionState::SessionUp {
            return Vec::new();
        }

        match self.session.service_once().await {
            Ok(messages) => messages,
            Err(e) => {
                let error: SessionError = e.into();
                warn!(error = %error, "Session service failed");
                self.refresh_state();
                Vec::new()
            }
        }
    }
}
