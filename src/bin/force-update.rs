//! Force-update trigger
//!
//! Makes a running sensor node publish a reading immediately, the same way
//! the dashboard does it.
//!
//! ## Usage
//!
//! ```bash
//! # Trigger the node with identity 0A1B
//! force-update --device-id 0A1B
//!
//! # Another device type on a remote broker
//! force-update --device-type ESP32 --device-id 7F00 --broker-url mqtt://192.168.1.20:1883
//! ```

use clap::Parser;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use sensor_node::protocol::{command_topic_for, UPDATE_COMMAND};
use sensor_node::transport::mqtt::{route_mqtt_event, BrokerEndpoint, EventRoute};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "force-update",
    about = "Ask a sensor node to publish a reading now"
)]
struct Args {
    /// Identity token of the target node (4 hex digits)
    #[arg(long, required = true)]
    device_id: String,

    /// Device type segment of the node's topics
    #[arg(long, default_value = "ESP8266")]
    device_type: String,

    /// MQTT broker URL
    #[arg(long, default_value = "mqtt://localhost:1883")]
    broker_url: String,

    /// Payload to send; nodes only act on UPDATE
    #[arg(long, default_value = UPDATE_COMMAND)]
    payload: String,

    /// Seconds to wait for the broker
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let endpoint = BrokerEndpoint::parse(&args.broker_url)?;
    let topic = command_topic_for(&args.device_type, &args.device_id);

    let client_id = format!("force-update-{}", uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);
    options.set_keep_alive(Duration::from_secs(30));
    if endpoint.tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }

    let (client, mut eventloop) = AsyncClient::new(options, 10);

    println!("Connecting to MQTT broker {}:{}...", endpoint.host, endpoint.port);
    client
        .publish(topic.clone(), QoS::AtLeastOnce, false, args.payload.clone().into_bytes())
        .await?;

    let wait = Duration::from_secs(args.timeout_secs);
    let delivery = tokio::time::timeout(wait, await_delivery(&mut eventloop)).await;

    match delivery {
        Ok(Ok(())) => {
            println!("✓ Sent {:?} to {}", args.payload, topic);
            let _ = client.disconnect().await;
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(format!("no acknowledgement within {}s", args.timeout_secs).into()),
    }
}

/// Drive the event loop until the broker acknowledges the publish
async fn await_delivery(eventloop: &mut EventLoop) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let event = eventloop.poll().await?;
        if let Event::Incoming(Packet::PubAck(_)) = event {
            return Ok(());
        }
        if route_mqtt_event(&event) == (EventRoute::ConnectionAcknowledged { accepted: false }) {
            return Err("broker refused the connection".into());
        }
    }
}
