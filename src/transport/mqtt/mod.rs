//! MQTT session implementation
//!
//! - [`connection`] - broker URL parsing, client options, result codes
//! - [`message_handler`] - pure routing of event loop events
//! - [`client`] - the [`MqttSession`] I/O wrapper
//!
//! # Usage
//!
//! ```rust,no_run
//! use sensor_node::config::MqttSection;
//! use sensor_node::transport::mqtt::MqttSession;
//! use sensor_node::transport::MessagingSession;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     keep_alive_secs: 60,
//!     connect_timeout_secs: 10,
//!     diagnostic_topics: vec!["sensors/#".to_string()],
//! };
//!
//! let mut session = MqttSession::new(config, None, None);
//! session.connect("0A1B").await?;
//! session.subscribe("sensors/ESP8266/0A1B/forceUpdate").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttSession;
pub use connection::{configure_mqtt_options, BrokerEndpoint};
pub use message_handler::{route_mqtt_event, EventRoute};
