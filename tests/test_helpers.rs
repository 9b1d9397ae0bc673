//! Test helpers and utilities for integration tests

use sensor_node::agent::{
    ConnectionManager, ConnectionSettings, RetryPolicy, SchedulerOptions, SensorAgent,
};
use sensor_node::config::PublishProfile;
use sensor_node::protocol::{build_topics, Channel, TopicNamespace};
use sensor_node::testing::{
    ManualClock, MockLink, MockProbe, MockSensors, MockSession, RecordingSleeper,
};
use std::time::Duration;

pub const DEVICE_TYPE: &str = "ESP8266";
pub const IDENTITY: &str = "0A1B";
pub const SSID: &str = "lab-net";

pub type TestAgent = SensorAgent<MockLink, MockSession, MockSensors>;

/// Handles onto the shared state of every mock wired into a test agent
#[allow(dead_code)]
pub struct Harness {
    pub link: MockLink,
    pub session: MockSession,
    pub sensors: MockSensors,
    pub clock: ManualClock,
    pub retry_sleeper: RecordingSleeper,
    pub probe: MockProbe,
}

pub fn test_topics() -> TopicNamespace {
    build_topics(DEVICE_TYPE, IDENTITY, &Channel::names())
}

pub fn test_settings(topics: &TopicNamespace) -> ConnectionSettings {
    ConnectionSettings {
        client_token: IDENTITY.to_string(),
        ssid: SSID.to_string(),
        password: "secret".to_string(),
        subscriptions: topics.subscriptions(&["sensors/#".to_string(), "home/#".to_string()]),
        broker_host: "broker.local".to_string(),
        broker_port: 1883,
        link_retry: RetryPolicy::fixed(500),
        session_retry: RetryPolicy::fixed(5000),
    }
}

/// Connection manager over fresh mocks
#[allow(dead_code)]
pub fn test_manager() -> (ConnectionManager<MockLink, MockSession>, Harness) {
    let link = MockLink::new();
    let session = MockSession::new();
    let clock = ManualClock::new(0);
    let retry_sleeper = RecordingSleeper::new();
    let probe = MockProbe::new(true);

    let manager = ConnectionManager::new(
        link.clone(),
        session.clone(),
        Box::new(retry_sleeper.clone()),
        Some(Box::new(probe.clone())),
        test_settings(&test_topics()),
    );

    let harness = Harness {
        link,
        session,
        sensors: MockSensors::new(512, 23.45),
        clock,
        retry_sleeper,
        probe,
    };
    (manager, harness)
}

/// Sensor agent over fresh mocks; the clock starts at 0 and only moves when
/// a test advances it
#[allow(dead_code)]
pub fn test_agent(profile: PublishProfile) -> (TestAgent, Harness) {
    let (manager, harness) = test_manager();
    let options = SchedulerOptions {
        profile,
        interval_ms: profile.default_interval_ms(),
        poll_interval: Duration::from_millis(10),
        compact_topic: "sensor/data".to_string(),
    };

    let agent = SensorAgent::new(
        manager,
        test_topics(),
        DEVICE_TYPE,
        harness.sensors.clone(),
        Box::new(harness.clock.clone()),
        Box::new(RecordingSleeper::new()),
        options,
    );
    (agent, harness)
}
