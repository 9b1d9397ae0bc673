//! Observability for the sensor node
//!
//! Structured logging only; the node exposes no metrics or health endpoints.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{connection_span, publish_span};
