//! Mock implementations for testing
//!
//! Provides mock link, session, sensors, clock, sleeper and probe so the
//! agent can be exercised without a network or broker. Every mock is a cheap
//! clone over shared state: hand one clone to the agent and keep another to
//! script failures and inspect what happened.

use crate::error::{LinkError, SessionError};
use crate::sensors::SensorSource;
use crate::time::{Clock, Sleeper};
use crate::transport::{
    InboundMessage, LinkStatus, MessagingSession, NetworkLink, ReachabilityProbe,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type PublishedMessage = (String, Vec<u8>);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct LinkInner {
    up: bool,
    join_requested: bool,
    connect_calls: u32,
    failing_connects: u32,
    polls_until_up: u32,
    ssid: String,
}

/// Mock network link
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` join requests
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.inner).failing_connects = count;
    }

    /// Report `Disconnected` for this many status polls after a join request
    pub fn up_after_polls(&self, polls: u32) {
        lock(&self.inner).polls_until_up = polls;
    }

    /// Simulate losing the network
    pub fn drop_link(&self) {
        let mut inner = lock(&self.inner);
        inner.up = false;
        inner.join_requested = false;
    }

    pub fn connect_calls(&self) -> u32 {
        lock(&self.inner).connect_calls
    }
}

#[async_trait]
impl NetworkLink for MockLink {
    type Error = LinkError;

    async fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), Self::Error> {
        let mut inner = lock(&self.inner);
        inner.connect_calls += 1;
        inner.ssid = ssid.to_string();

        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(LinkError::JoinFailed {
                ssid: ssid.to_string(),
                reason: "mock join failure".to_string(),
            });
        }

        inner.join_requested = true;
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        let mut inner = lock(&self.inner);
        if !inner.up && inner.join_requested {
            if inner.polls_until_up == 0 {
                inner.up = true;
            } else {
                inner.polls_until_up -= 1;
            }
        }

        if inner.up {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }

    fn local_address(&self) -> Option<IpAddr> {
        lock(&self.inner)
            .up
            .then_some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)))
    }

    fn ssid(&self) -> String {
        lock(&self.inner).ssid.clone()
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    connected: bool,
    connect_calls: u32,
    failing_connects: u32,
    client_tokens: Vec<String>,
    published: Vec<PublishedMessage>,
    subscribed: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    fail_publish: bool,
    lose_on_next_service: bool,
    calls_while_disconnected: u32,
}

/// Mock messaging session recording everything sent through it
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` handshakes
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.inner).failing_connects = count;
    }

    /// Refuse every publish while set
    pub fn set_fail_publish(&self, fail: bool) {
        lock(&self.inner).fail_publish = fail;
    }

    /// Queue a message for the next `service_once`
    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        lock(&self.inner)
            .inbound
            .push_back(InboundMessage::new(topic, payload));
    }

    /// Drop the session immediately
    pub fn drop_session(&self) {
        lock(&self.inner).connected = false;
    }

    /// Let the next `service_once` discover a lost session
    pub fn lose_on_next_service(&self) {
        lock(&self.inner).lose_on_next_service = true;
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.inner).published.clone()
    }

    pub fn published_topics(&self) -> Vec<String> {
        lock(&self.inner)
            .published
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn subscribed(&self) -> Vec<String> {
        lock(&self.inner).subscribed.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        lock(&self.inner).connect_calls
    }

    pub fn client_tokens(&self) -> Vec<String> {
        lock(&self.inner).client_tokens.clone()
    }

    /// Publishes and subscribes attempted without a live session
    pub fn calls_while_disconnected(&self) -> u32 {
        lock(&self.inner).calls_while_disconnected
    }

    pub fn clear_history(&self) {
        let mut inner = lock(&self.inner);
        inner.published.clear();
        inner.subscribed.clear();
    }
}

#[async_trait]
impl MessagingSession for MockSession {
    type Error = SessionError;

    async fn connect(&mut self, client_token: &str) -> Result<(), Self::Error> {
        let mut inner = lock(&self.inner);
        inner.connect_calls += 1;
        inner.client_tokens.push(client_token.to_string());

        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(SessionError::ConnectFailed {
                code: -2,
                reason: "mock handshake failure".to_string(),
            });
        }

        inner.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            inner.calls_while_disconnected += 1;
            return Err(SessionError::Lost("mock session down".to_string()));
        }
        inner.subscribed.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            inner.calls_while_disconnected += 1;
            return Err(SessionError::Lost("mock session down".to_string()));
        }
        if inner.fail_publish {
            return Err(SessionError::PublishFailed(format!("{topic}: mock refusal")));
        }
        inner.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn service_once(&mut self) -> Result<Vec<InboundMessage>, Self::Error> {
        let mut inner = lock(&self.inner);
        if inner.lose_on_next_service {
            inner.lose_on_next_service = false;
            inner.connected = false;
            return Err(SessionError::Lost("mock connection reset".to_string()));
        }
        if !inner.connected {
            return Ok(Vec::new());
        }
        Ok(inner.inbound.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }
}

/// Mock sensors with settable readings
#[derive(Debug, Clone)]
pub struct MockSensors {
    readings: Arc<Mutex<(i32, f32)>>,
}

impl MockSensors {
    pub fn new(light: i32, temperature: f32) -> Self {
        Self {
            readings: Arc::new(Mutex::new((light, temperature))),
        }
    }

    pub fn set(&self, light: i32, temperature: f32) {
        *lock(&self.readings) = (light, temperature);
    }
}

impl SensorSource for MockSensors {
    fn read_light(&mut self) -> i32 {
        lock(&self.readings).0
    }

    fn read_temperature(&mut self) -> f32 {
        lock(&self.readings).1
    }
}

/// Clock advanced by hand
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Sleeper that returns at once and records every requested wait
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
    clock: Option<ManualClock>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `clock` by each requested wait
    pub fn driving(clock: ManualClock) -> Self {
        Self {
            waits: Arc::default(),
            clock: Some(clock),
        }
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.waits).push(duration);
        if let Some(clock) = &self.clock {
            clock.advance(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        }
        tokio::task::yield_now().await;
    }
}

/// Probe with a fixed answer that records its targets
#[derive(Debug, Clone)]
pub struct MockProbe {
    reachable: bool,
    targets: Arc<Mutex<Vec<(String, u16)>>>,
}

impl MockProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable,
            targets: Arc::default(),
        }
    }

    pub fn targets(&self) -> Vec<(String, u16)> {
        lock(&self.targets).clone()
    }
}

#[async_trait]
impl ReachabilityProbe for MockProbe {
    async fn probe(&self, host: &str, port: u16) -> bool {
        lock(&self.targets).push((host.to_string(), port));
        self.reachable
    }
}
