//! Pure connection configuration for the MQTT session
//!
//! Broker URL parsing, client options and handshake result codes. Nothing in
//! here touches the network.

use crate::config::MqttSection;
use crate::error::SessionError;
use rumqttc::v5::{ConnectionError, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Handshake did not complete in time
pub const RC_CONNECT_TIMEOUT: i32 = -4;
/// Session dropped after it was established
pub const RC_CONNECTION_LOST: i32 = -3;
/// Network-level failure before a ConnAck arrived
pub const RC_CONNECT_FAILED: i32 = -2;
/// Broker answered the handshake with a refusal
pub const RC_CONNECT_REFUSED: i32 = 5;

/// Broker host and port parsed from `mqtt://` or `mqtts://` URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    pub fn parse(broker_url: &str) -> Result<Self, SessionError> {
        let url =
            Url::parse(broker_url).map_err(|_| SessionError::InvalidBrokerUrl(broker_url.to_string()))?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            _ => return Err(SessionError::InvalidBrokerUrl(broker_url.to_string())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| SessionError::InvalidBrokerUrl(broker_url.to_string()))?
            .to_string();
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self { host, port, tls })
    }
}

/// Build client options; the identity token is used verbatim as client ID
pub fn configure_mqtt_options(
    client_token: &str,
    config: &MqttSection,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<MqttOptions, SessionError> {
    let endpoint = BrokerEndpoint::parse(&config.broker_url)?;
    let mut mqtt_options = MqttOptions::new(client_token, endpoint.host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = username {
        mqtt_options.set_credentials(username, password.unwrap_or_default());
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}

/// Map an event loop failure during the handshake to a session error
pub fn handshake_error(error: &ConnectionError) -> SessionError {
    match error {
        ConnectionError::ConnectionRefused(code) => SessionError::ConnectFailed {
            code: RC_CONNECT_REFUSED,
            reason: format!("refused by broker: {code:?}"),
        },
        other => SessionError::ConnectFailed {
            code: RC_CONNECT_FAILED,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            diagnostic_topics: Vec::new(),
        }
    }

    #[test]
    fn test_endpoint_defaults_port_by_scheme() {
        let plain = BrokerEndpoint::parse("mqtt://broker.local").unwrap();
        assert_eq!(plain.port, 1883);
        assert!(!plain.tls);

        let secure = BrokerEndpoint::parse("mqtts://broker.local").unwrap();
        assert_eq!(secure.port, 8883);
        assert!(secure.tls);

        let explicit = BrokerEndpoint::parse("mqtt://192.168.1.20:1884").unwrap();
        assert_eq!(explicit.host, "192.168.1.20");
        assert_eq!(explicit.port, 1884);
    }

    #[test]
    fn test_endpoint_rejects_other_schemes() {
        assert!(matches!(
            BrokerEndpoint::parse("http://broker.local"),
            Err(SessionError::InvalidBrokerUrl(_))
        ));
        assert!(BrokerEndpoint::parse("invalid-url").is_err());
    }

    #[test]
    fn test_configure_mqtt_options_uses_token_as_client_id() {
        let options = configure_mqtt_options("0A1B", &test_mqtt_config(), None, None).unwrap();
        assert_eq!(options.client_id(), "0A1B");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_mqtt_config();
        config.broker_url = "invalid-url".to_string();
        let result = configure_mqtt_options("0A1B", &config, None, None);
        assert!(matches!(result, Err(SessionError::InvalidBrokerUrl(_))));
    }
}
