//! MQTT session tests against a real broker
//!
//! Need a broker at localhost:1883; run with `cargo test -- --ignored`.

use sensor_node::config::MqttSection;
use sensor_node::transport::mqtt::MqttSession;
use sensor_node::transport::MessagingSession;
use std::time::Duration;

const MQTT_BROKER_URL: &str = "mqtt://localhost:1883";

fn mqtt_config() -> MqttSection {
    MqttSection {
        broker_url: MQTT_BROKER_URL.to_string(),
        username_env: None,
        password_env: None,
        keep_alive_secs: 30,
        connect_timeout_secs: 5,
        diagnostic_topics: Vec::new(),
    }
}

/// Service the session until a message arrives or the deadline passes
async fn next_message(session: &mut MqttSession, deadline: Duration) -> Option<(String, Vec<u8>)> {
    let poll = async {
        loop {
            let messages = session.service_once().await.ok()?;
            if let Some(message) = messages.into_iter().next() {
                return Some((message.topic, message.payload));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(deadline, poll).await.ok().flatten()
}

#[tokio::test]
#[ignore = "requires an MQTT broker on localhost:1883"]
async fn test_command_round_trip_through_broker() {
    let topic = format!("sensors/TEST/{:04X}/forceUpdate", std::process::id() & 0xFFFF);

    let mut node = MqttSession::new(mqtt_config(), None, None);
    node.connect(&format!("it-node-{}", std::process::id()))
        .await
        .unwrap();
    node.subscribe(&topic).await.unwrap();
    // Flush the subscribe before anything is published
    for _ in 0..20 {
        node.service_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut controller = MqttSession::new(mqtt_config(), None, None);
    controller
        .connect(&format!("it-controller-{}", std::process::id()))
        .await
        .unwrap();
    controller.publish(&topic, b"UPDATE").await.unwrap();
    controller.service_once().await.unwrap();

    let (received_topic, payload) = next_message(&mut node, Duration::from_secs(5))
        .await
        .expect("command should arrive");
    assert_eq!(received_topic, topic);
    assert_eq!(payload, b"UPDATE");
}

#[tokio::test]
#[ignore = "requires an MQTT broker on localhost:1883"]
async fn test_session_reports_connected() {
    let mut session = MqttSession::new(mqtt_config(), None, None);
    session.connect("it-status").await.unwrap();
    assert!(session.is_connected());
}
