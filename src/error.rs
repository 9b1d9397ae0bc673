//! Error types for the sensor node
//!
//! Each layer owns a focused `thiserror` enum; [`NodeError`] gathers them for
//! callers that drive the whole agent (the binaries and integration tests).

use crate::agent::connection::ConnectionState;
use crate::transport::mqtt::connection::RC_CONNECT_TIMEOUT;
use thiserror::Error;

/// Persistent storage failures
///
/// Any of these while recovering the device identity is fatal: the node has
/// no safe fallback identity and must not publish under an undefined one.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Persistent storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage offset {offset} out of bounds (size {size})")]
    OutOfBounds { offset: usize, size: usize },
    #[error("Storage accessed before begin()")]
    NotStarted,
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network link failures
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to join network '{ssid}': {reason}")]
    JoinFailed { ssid: String, reason: String },
    #[error("Network address resolution failed for {0}")]
    Resolution(String),
}

/// Messaging session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session handshake failed, rc={code}: {reason}")]
    ConnectFailed { code: i32, reason: String },
    #[error("Session handshake timed out after {0}ms, rc={rc}", rc = RC_CONNECT_TIMEOUT)]
    ConnectTimeout(u64),
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Session lost: {0}")]
    Lost(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Main error type for sensor node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl NodeError {
    /// Whether the node must halt instead of retrying
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::Storage(_) | NodeError::Config(_))
    }
}

/// Result type for sensor node operations
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_fatal() {
        let error: NodeError = StorageError::Unavailable("eeprom missing".to_string()).into();
        assert!(error.is_fatal());
        assert_eq!(
            error.to_string(),
            "Storage error: Persistent storage unavailable: eeprom missing"
        );
    }

    #[test]
    fn test_session_errors_are_recoverable() {
        let error: NodeError = SessionError::ConnectFailed {
            code: -2,
            reason: "connection refused".to_string(),
        }
        .into();
        assert!(!error.is_fatal());
        assert!(error.to_string().contains("rc=-2"));
    }

    #[test]
    fn test_not_connected_reports_state() {
        let error = SessionError::NotConnected {
            state: ConnectionState::LinkUp,
        };
        assert!(error.to_string().contains("LinkUp"));
    }

    #[test]
    fn test_timeout_reports_rc() {
        let error = SessionError::ConnectTimeout(10_000);
        assert_eq!(
            error.to_string(),
            "Session handshake timed out after 10000ms, rc=-4"
        );
    }

    #[test]
    fn test_out_of_bounds_display() {
        let error = StorageError::OutOfBounds { offset: 7, size: 5 };
        assert_eq!(error.to_string(), "Storage offset 7 out of bounds (size 5)");
    }
}
