//! Sensor Node
//!
//! A light and temperature telemetry node. It keeps a persistent 4-digit hex
//! identity, publishes one JSON envelope per channel over MQTT on a fixed
//! interval, and publishes immediately when it receives `UPDATE` on its
//! command topic.
//!
//! # Overview
//!
//! - [`identity`] recovers or creates the identity in a signed storage slot
//! - [`protocol`] derives the topic namespace and defines the wire formats
//! - [`agent`] connects, listens for commands and schedules publishing
//! - [`transport`] holds the link and session traits and their host
//!   implementations
//!
//! # Quick Start
//!
//! ```rust
//! use sensor_node::identity::{load_or_create_identity, IdentityOptions};
//! use sensor_node::protocol::{build_topics, Channel};
//! use sensor_node::storage::MemoryStorage;
//! use rand::SeedableRng;
//!
//! let mut storage = MemoryStorage::new();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let identity =
//!     load_or_create_identity(&mut storage, &mut rng, IdentityOptions::default()).unwrap();
//!
//! let topics = build_topics("ESP8266", identity.as_str(), &Channel::names());
//! assert_eq!(
//!     topics.command_topic(),
//!     format!("sensors/ESP8266/{identity}/forceUpdate")
//! );
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod identity;
pub mod observability;
pub mod protocol;
pub mod sensors;
pub mod storage;
pub mod testing;
pub mod time;
pub mod transport;

pub use agent::{AgentContext, ConnectionManager, ConnectionState, SensorAgent};
pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use identity::{load_or_create_identity, DeviceIdentity};
pub use protocol::*;
