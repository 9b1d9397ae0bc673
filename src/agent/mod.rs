//! The sensor agent
//!
//! [`SensorAgent`] ties the pieces together: the [`ConnectionManager`] keeps
//! link and session up, the [`CommandListener`] turns inbound messages into a
//! pending force-update, and the [`TelemetryPublisher`] sends one envelope per
//! channel whenever a cycle is due.

pub mod command;
pub mod connection;
pub mod context;
pub mod publisher;
pub mod scheduler;

pub use command::CommandListener;
pub use connection::{ConnectionManager, ConnectionSettings, ConnectionState, RetryPolicy};
pub use context::{AgentContext, PublishStats};
pub use publisher::TelemetryPublisher;
pub use scheduler::{CycleKind, SchedulerOptions, SensorAgent, TickOutcome};
