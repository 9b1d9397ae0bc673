//! Telemetry publishing
//!
//! Builds envelopes and hands them to the connection manager. A failed publish
//! is logged and counted, never retried: the next cycle carries a fresh value.

use super::connection::ConnectionManager;
use super::context::AgentContext;
use crate::error::SessionError;
use crate::protocol::{Channel, CompactReading, EventLabel, ReadingValue, TelemetryEnvelope};
use crate::transport::{MessagingSession, NetworkLink};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TelemetryPublisher {
    device_type: String,
    client_id: String,
}

impl TelemetryPublisher {
    pub fn new(device_type: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            client_id: client_id.into(),
        }
    }

    /// Envelope for one channel reading (pure)
    pub fn build_envelope(
        &self,
        topic: &str,
        event: EventLabel,
        channel: Channel,
        value: ReadingValue,
        wifi_ssid: String,
    ) -> TelemetryEnvelope {
        TelemetryEnvelope {
            event,
            topic: topic.to_string(),
            client_type: self.device_type.clone(),
            client_id: self.client_id.clone(),
            data_type: channel.name().to_string(),
            data_value: value.to_string(),
            wifi_ssid,
        }
    }

    /// Publish one channel reading; returns whether the session accepted it
    pub async fn publish<L, S>(
        &self,
        manager: &mut ConnectionManager<L, S>,
        ctx: &mut AgentContext,
        topic: &str,
        event: EventLabel,
        channel: Channel,
        value: ReadingValue,
    ) -> bool
    where
        L: NetworkLink,
        S: MessagingSession,
        S::Error: Into<SessionError>,
    {
        let envelope = self.build_envelope(topic, event, channel, value, manager.link().ssid());

        if let Ok(pretty) = envelope.to_pretty() {
            info!("Publishing to {}:\n{}", topic, pretty);
        }

        let delivered = match envelope.to_payload() {
            Ok(payload) => Self::send(manager, topic, &payload).await,
            Err(e) => {
                warn!(%topic, error = %e, "Failed to serialize envelope");
                false
            }
        };
        ctx.stats.record(delivered);
        delivered
    }

    /// Publish the combined reading of the compact profile
    pub async fn publish_compact<L, S>(
        &self,
        manager: &mut ConnectionManager<L, S>,
        ctx: &mut AgentContext,
        topic: &str,
        reading: &CompactReading,
    ) -> bool
    where
        L: NetworkLink,
        S: MessagingSession,
        S::Error: Into<SessionError>,
    {
        let delivered = match reading.to_payload() {
            Ok(payload) => {
                info!(
                    %topic,
                    temperature = reading.temperature,
                    light = reading.light,
                    "Publishing compact reading"
                );
                Self::send(manager, topic, &payload).await
            }
            Err(e) => {
                warn!(%topic, error = %e, "Failed to serialize reading");
                false
            }
        };
        ctx.stats.record(delivered);
        delivered
    }

    async fn send<L, S>(manager: &mut ConnectionManager<L, S>, topic: &str, payload: &[u8]) -> bool
    where
        L: NetworkLink,
        S: MessagingSession,
        S::Error: Into<SessionError>,
    {
        match manager.publish(topic, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%topic, error = %e, "Publish failed");
                false
            }
        }
    }
}
