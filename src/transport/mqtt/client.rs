//! Impure I/O for the MQTT session
//!
//! The session is driven cooperatively: nothing runs in the background, and
//! the event loop only makes progress inside [`MqttSession::connect`] and
//! [`MqttSession::service_once`]. Requests queued by `publish` and
//! `subscribe` are flushed on the next service call.

use super::connection::{
    configure_mqtt_options, handshake_error, RC_CONNECTION_LOST, RC_CONNECT_REFUSED,
};
use super::message_handler::{route_mqtt_event, EventRoute};
use crate::config::MqttSection;
use crate::error::SessionError;
use crate::transport::{InboundMessage, MessagingSession};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Request channel capacity between client handle and event loop
const REQUEST_CAPACITY: usize = 32;
/// How long one service call waits for the next event
const SERVICE_POLL_TIMEOUT: Duration = Duration::from_millis(5);
/// Events handled per service call before yielding back to the scheduler
const MAX_EVENTS_PER_SERVICE: usize = 64;

/// MQTT v5 session backed by rumqttc
pub struct MqttSession {
    config: MqttSection,
    username: Option<String>,
    password: Option<String>,
    client: Option<AsyncClient>,
    event_loop: Option<Mutex<EventLoop>>,
    connected: bool,
}

impl MqttSession {
    pub fn new(config: MqttSection, username: Option<String>, password: Option<String>) -> Self {
        Self {
            config,
            username,
            password,
            client: None,
            event_loop: None,
            connected: false,
        }
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.config.connect_timeout_secs.max(1))
    }

    /// Poll until the broker answers the handshake
    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), SessionError> {
        loop {
            let event = event_loop.poll().await.map_err(|e| handshake_error(&e))?;
            match route_mqtt_event(&event) {
                EventRoute::ConnectionAcknowledged { accepted: true } => return Ok(()),
                EventRoute::ConnectionAcknowledged { accepted: false } => {
                    return Err(SessionError::ConnectFailed {
                        code: RC_CONNECT_REFUSED,
                        reason: "refused by broker".to_string(),
                    })
                }
                other => debug!("Ignoring event before ConnAck: {:?}", other),
            }
        }
    }

    fn client(&self) -> Result<&AsyncClient, SessionError> {
        match &self.client {
            Some(client) if self.connected => Ok(client),
            _ => Err(SessionError::Lost("session not established".to_string())),
        }
    }

    fn mark_lost(&mut self) {
        self.connected = false;
        self.client = None;
        self.event_loop = None;
    }
}

#[async_trait]
impl MessagingSession for MqttSession {
    type Error = SessionError;

    async fn connect(&mut self, client_token: &str) -> Result<(), Self::Error> {
        self.mark_lost();

        let options = configure_mqtt_options(
            client_token,
            &self.config,
            self.username.as_deref(),
            self.password.as_deref(),
        )?;
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let timeout = self.connect_timeout();
        match tokio::time::timeout(timeout, Self::wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SessionError::ConnectTimeout(timeout.as_millis() as u64)),
        }

        info!("MQTT session established as {}", client_token);
        self.client = Some(client);
        self.event_loop = Some(Mutex::new(event_loop));
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.client()?
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| SessionError::SubscriptionFailed(format!("{topic}: {e}")))
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.client()?
            .try_publish(topic.to_string(), QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| SessionError::PublishFailed(format!("{topic}: {e}")))
    }

    async fn service_once(&mut self) -> Result<Vec<InboundMessage>, Self::Error> {
        let mut inbound = Vec::new();
        let mut lost = None;

        if let Some(event_loop) = self.event_loop.as_ref() {
            let mut event_loop = event_loop.lock().await;
            for _ in 0..MAX_EVENTS_PER_SERVICE {
                match tokio::time::timeout(SERVICE_POLL_TIMEOUT, event_loop.poll()).await {
                    Ok(Ok(event)) => match route_mqtt_event(&event) {
                        EventRoute::MessageReceived(message) => inbound.push(message),
                        EventRoute::Disconnected => {
                            lost = Some("broker closed the session".to_string());
                            break;
                        }
                        EventRoute::ConnectionAcknowledged { .. } | EventRoute::Infrastructure => {}
                    },
                    Ok(Err(e)) => {
                        lost = Some(e.to_string());
                        break;
                    }
                    Err(_) => break,
                }
            }
        }

        if let Some(reason) = lost {
            warn!(code = RC_CONNECTION_LOST, %reason, "MQTT session lost");
            self.mark_lost();
            return Err(SessionError::Lost(reason));
        }

        Ok(inbound)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::connection::{ConnectionManager, ConnectionSettings, RetryPolicy};
    use crate::time::TokioSleeper;
    use crate::transport::HostLink;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// CONNACK accepting the session, with an empty property block
    const CONNACK: [u8; 5] = [0x20, 0x03, 0x00, 0x00, 0x00];
    /// Server-initiated DISCONNECT, normal disconnection
    const DISCONNECT: [u8; 2] = [0xE0, 0x00];
    const COMMAND_TOPIC: &str = "sensors/ESP8266/0A1B/forceUpdate";

    fn unreachable_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://127.0.0.1:1".to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 1,
            diagnostic_topics: Vec::new(),
        }
    }

    fn local_config(port: u16) -> MqttSection {
        MqttSection {
            broker_url: format!("mqtt://127.0.0.1:{port}"),
            ..unreachable_config()
        }
    }

    /// QoS 0 PUBLISH with an empty property block
    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let remaining = 2 + topic.len() + 1 + payload.len();
        assert!(remaining < 128, "single-byte remaining length only");
        let mut packet = vec![
            0x30,
            remaining as u8,
            (topic.len() >> 8) as u8,
            topic.len() as u8,
        ];
        packet.extend_from_slice(topic.as_bytes());
        packet.push(0x00);
        packet.extend_from_slice(payload);
        packet
    }

    #[derive(Clone, Copy)]
    enum AfterScript {
        HoldOpen,
        Close,
    }

    /// Accept every client, answer its CONNECT, then write `script`
    async fn scripted_broker(script: Vec<u8>, after: AfterScript) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let script = script.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                        return;
                    }
                    socket.write_all(&CONNACK).await.unwrap();
                    socket.write_all(&script).await.unwrap();
                    if let AfterScript::HoldOpen = after {
                        while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
                    }
                });
            }
        });

        port
    }

    /// Service until `count` messages arrived or the session errors
    async fn drain(
        session: &mut MqttSession,
        count: usize,
    ) -> (Vec<Vec<InboundMessage>>, Option<SessionError>) {
        let mut batches = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while batches.iter().map(Vec::len).sum::<usize>() < count
            && tokio::time::Instant::now() < deadline
        {
            match session.service_once().await {
                Ok(batch) if batch.is_empty() => tokio::task::yield_now().await,
                Ok(batch) => batches.push(batch),
                Err(e) => return (batches, Some(e)),
            }
        }
        (batches, None)
    }

    #[test]
    fn test_session_drives_connection_manager() {
        fn manager(session: MqttSession) -> ConnectionManager<HostLink, MqttSession> {
            let settings = ConnectionSettings {
                client_token: "0A1B".to_string(),
                ssid: "lab-net".to_string(),
                password: String::new(),
                subscriptions: vec![COMMAND_TOPIC.to_string()],
                broker_host: "127.0.0.1".to_string(),
                broker_port: 1,
                link_retry: RetryPolicy::fixed(500),
                session_retry: RetryPolicy::fixed(5000),
            };
            ConnectionManager::new(
                HostLink::new("lab-net", "127.0.0.1", 1),
                session,
                Box::new(TokioSleeper),
                None,
                settings,
            )
        }

        let manager = manager(MqttSession::new(unreachable_config(), None, None));
        assert!(!manager.session().is_connected());
    }

    #[tokio::test]
    async fn test_operations_fail_before_connect() {
        let mut session = MqttSession::new(unreachable_config(), None, None);
        assert!(!session.is_connected());

        assert!(matches!(
            session.publish("sensor/data", b"{}").await,
            Err(SessionError::Lost(_))
        ));
        assert!(matches!(
            session.subscribe("sensors/#").await,
            Err(SessionError::Lost(_))
        ));
        assert!(session.service_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let mut session = MqttSession::new(unreachable_config(), None, None);
        let result = session.connect("0A1B").await;
        assert!(matches!(
            result,
            Err(SessionError::ConnectFailed { .. }) | Err(SessionError::ConnectTimeout(_))
        ));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let mut config = unreachable_config();
        config.broker_url = "not a url".to_string();
        let mut session = MqttSession::new(config, None, None);
        assert!(matches!(
            session.connect("0A1B").await,
            Err(SessionError::InvalidBrokerUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_service_drains_inbound_publish() {
        let script = publish_packet(COMMAND_TOPIC, b"UPDATE");
        let port = scripted_broker(script, AfterScript::HoldOpen).await;
        let mut session = MqttSession::new(local_config(port), None, None);

        session.connect("0A1B").await.unwrap();
        assert!(session.is_connected());

        let (batches, error) = drain(&mut session, 1).await;
        assert!(error.is_none());
        let messages: Vec<_> = batches.into_iter().flatten().collect();
        assert_eq!(messages, vec![InboundMessage::new(COMMAND_TOPIC, "UPDATE")]);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_service_batches_are_bounded() {
        let total = MAX_EVENTS_PER_SERVICE + 6;
        let script: Vec<u8> = (0..total)
            .flat_map(|i| publish_packet("sensors/load", i.to_string().as_bytes()))
            .collect();
        let port = scripted_broker(script, AfterScript::HoldOpen).await;
        let mut session = MqttSession::new(local_config(port), None, None);
        session.connect("0A1B").await.unwrap();

        let (batches, error) = drain(&mut session, total).await;
        assert!(error.is_none());
        assert!(batches.len() >= 2);
        assert!(batches.iter().all(|batch| batch.len() <= MAX_EVENTS_PER_SERVICE));
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), total);
    }

    #[tokio::test]
    async fn test_broker_disconnect_marks_session_lost() {
        let port = scripted_broker(DISCONNECT.to_vec(), AfterScript::HoldOpen).await;
        let mut session = MqttSession::new(local_config(port), None, None);
        session.connect("0A1B").await.unwrap();

        let (_, error) = drain(&mut session, 1).await;
        assert!(matches!(error, Some(SessionError::Lost(_))));
        assert!(!session.is_connected());
        assert!(matches!(
            session.publish(COMMAND_TOPIC, b"UPDATE").await,
            Err(SessionError::Lost(_))
        ));
    }

    #[tokio::test]
    async fn test_reconnect_after_closed_socket() {
        let port = scripted_broker(Vec::new(), AfterScript::Close).await;
        let mut session = MqttSession::new(local_config(port), None, None);
        session.connect("0A1B").await.unwrap();

        let (_, error) = drain(&mut session, 1).await;
        assert!(matches!(error, Some(SessionError::Lost(_))));
        assert!(!session.is_connected());

        session.connect("0A1B").await.unwrap();
        assert!(session.is_connected());
        assert!(session.publish(COMMAND_TOPIC, b"UPDATE").await.is_ok());
    }
}
