//! Pure routing of MQTT event loop events

use crate::transport::InboundMessage;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::Event;

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Handshake answered; `accepted` is false when the broker refused
    ConnectionAcknowledged { accepted: bool },
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Broker closed the session
    Disconnected,
    /// Keep-alive, acks and everything else the node ignores
    Infrastructure,
}

/// Route an event loop event
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(Packet::ConnAck(connack)) => EventRoute::ConnectionAcknowledged {
            accepted: connack.code == ConnectReturnCode::Success,
        },
        Event::Incoming(Packet::Publish(publish)) => EventRoute::MessageReceived(
            InboundMessage::new(
                String::from_utf8_lossy(&publish.topic).to_string(),
                publish.payload.to_vec(),
            ),
        ),
        Event::Incoming(Packet::Disconnect(_)) => EventRoute::Disconnected,
        _ => EventRoute::Infrastructure,
    }
}
