//! Inbound command handling

use super::context::AgentContext;
use crate::protocol::Command;
use tracing::{debug, info};

/// Watches the command topic for force-update requests
#[derive(Debug, Clone)]
pub struct CommandListener {
    command_topic: String,
}

impl CommandListener {
    pub fn new(command_topic: impl Into<String>) -> Self {
        Self {
            command_topic: command_topic.into(),
        }
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    /// Handle one inbound message; returns whether it requested an update.
    ///
    /// Messages on other topics (the diagnostic wildcards deliver plenty of
    /// them) and unknown payloads leave the context untouched.
    pub fn on_message(&self, ctx: &mut AgentContext, topic: &str, payload: &[u8]) -> bool {
        if topic != self.command_topic {
            debug!(%topic, bytes = payload.len(), "Ignoring message outside the command topic");
            return false;
        }

        match Command::decode(payload) {
            Command::ForceUpdate => {
                if ctx.force_update {
                    debug!("Force update already pending");
                } else {
                    info!("Force update requested");
                }
                ctx.force_update = true;
                true
            }
            Command::Unknown(text) => {
                debug!(command = %text, "Ignoring unknown command");
                false
            }
        }
    }
}
