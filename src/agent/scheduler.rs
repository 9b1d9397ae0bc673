//! Cooperative scheduler loop
//!
//! One tick keeps the connection alive, drains inbound messages into the
//! command listener and decides whether a publish cycle is due. A pending
//! force-update makes the cycle due immediately and restarts the interval.

use super::command::CommandListener;
use super::connection::{ConnectionManager, ConnectionState};
use super::context::AgentContext;
use super::publisher::TelemetryPublisher;
use crate::config::{PublishProfile, ScheduleSection};
use crate::error::SessionError;
use crate::protocol::{Channel, CompactReading, EventLabel, ReadingValue, TopicNamespace};
use crate::publish_span;
use crate::sensors::SensorSource;
use crate::time::{Clock, Sleeper};
use crate::transport::{MessagingSession, NetworkLink};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, trace, warn, Instrument};

/// Scheduler timing and output shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub profile: PublishProfile,
    pub interval_ms: u64,
    pub poll_interval: Duration,
    pub compact_topic: String,
}

impl SchedulerOptions {
    pub fn from_config(schedule: &ScheduleSection) -> Self {
        Self {
            profile: schedule.profile,
            interval_ms: schedule.interval_ms(),
            poll_interval: Duration::from_millis(schedule.poll_interval_ms),
            compact_topic: schedule.compact_topic.clone(),
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&ScheduleSection::default())
    }
}

/// What kind of publish cycle a tick ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Regular,
    Forced,
}

/// Result of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub state: ConnectionState,
    /// Inbound messages dispatched during the tick
    pub messages: usize,
    pub cycle: Option<CycleKind>,
}

/// The sensor agent: connection, command handling and periodic publishing
pub struct SensorAgent<L, S, Src> {
    manager: ConnectionManager<L, S>,
    listener: CommandListener,
    publisher: TelemetryPublisher,
    topics: TopicNamespace,
    sensors: Src,
    clock: Box<dyn Clock>,
    sleeper: Box<dyn Sleeper>,
    options: SchedulerOptions,
    context: AgentContext,
}

impl<L, S, Src> SensorAgent<L, S, Src>
where
    L: NetworkLink,
    S: MessagingSession,
    S::Error: Into<SessionError>,
    Src: SensorSource,
{
    pub fn new(
        manager: ConnectionManager<L, S>,
        topics: TopicNamespace,
        device_type: &str,
        sensors: Src,
        clock: Box<dyn Clock>,
        sleeper: Box<dyn Sleeper>,
        options: SchedulerOptions,
    ) -> Self {
        let listener = CommandListener::new(topics.command_topic());
        let publisher = TelemetryPublisher::new(device_type, manager.settings().client_token.clone());

        Self {
            manager,
            listener,
            publisher,
            topics,
            sensors,
            clock,
            sleeper,
            options,
            context: AgentContext::new(),
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn manager(&self) -> &ConnectionManager<L, S> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager<L, S> {
        &mut self.manager
    }

    pub fn topics(&self) -> &TopicNamespace {
        &self.topics
    }

    /// Run one scheduler iteration
    pub async fn tick(&mut self) -> TickOutcome {
        if self.manager.refresh_state() != ConnectionState::SessionUp {
            self.manager.ensure_connected().await;
        }

        let inbound = self.manager.service_once().await;
        for message in &inbound {
            self.listener
                .on_message(&mut self.context, &message.topic, &message.payload);
        }

        let now = self.clock.now_ms();
        let forced = self.context.force_update;
        let due = forced
            || now.saturating_sub(self.context.last_publish_ms) >= self.options.interval_ms;

        let cycle = if due {
            self.context.last_publish_ms = now;
            let span = publish_span!(forced, at_ms = now);
            self.publish_cycle(forced).instrument(span).await;
            self.context.force_update = false;
            Some(if forced {
                CycleKind::Forced
            } else {
                CycleKind::Regular
            })
        } else {
            None
        };

        TickOutcome {
            state: self.manager.state(),
            messages: inbound.len(),
            cycle,
        }
    }

    async fn publish_cycle(&mut self, forced: bool) {
        match self.options.profile {
            PublishProfile::Standard => self.publish_channels(forced).await,
            PublishProfile::Compact => self.publish_compact().await,
        }
    }

    async fn publish_channels(&mut self, forced: bool) {
        let event = EventLabel::for_cycle(forced);

        for channel in Channel::ALL {
            let value = match channel {
                Channel::Light => ReadingValue::Raw(self.sensors.read_light()),
                Channel::Temperature => ReadingValue::Celsius(self.sensors.read_temperature()),
            };

            let Some(topic) = self.topics.channel_topic(channel.name()) else {
                warn!(%channel, "No topic for channel");
                continue;
            };

            self.publisher
                .publish(&mut self.manager, &mut self.context, topic, event, channel, value)
                .await;
        }
    }

    async fn publish_compact(&mut self) {
        let reading = CompactReading::new(self.sensors.read_light(), self.sensors.read_temperature());
        self.publisher
            .publish_compact(
                &mut self.manager,
                &mut self.context,
                &self.options.compact_topic,
                &reading,
            )
            .await;
    }

    /// Tick until `shutdown` turns true or its sender is dropped
    ///
    /// Shutdown cancels the tick in flight: a cycle cut short keeps its
    /// force flag set and is only visible in `stats`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            client = %self.manager.settings().client_token,
            interval_ms = self.options.interval_ms,
            profile = ?self.options.profile,
            "Sensor agent started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                outcome = self.tick_and_pause() => trace!(?outcome, "Tick complete"),
            }
        }

        info!(
            delivered = self.context.stats.delivered,
            failed = self.context.stats.failed,
            "Sensor agent stopped"
        );
    }

    async fn tick_and_pause(&mut self) -> TickOutcome {
        let outcome = self.tick().await;
        self.sleeper.sleep(self.options.poll_interval).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[test]
    fn test_options_follow_profile() {
        let config = NodeConfig::test_config();
        let options = SchedulerOptions::from_config(&config.schedule);
        assert_eq!(options.profile, PublishProfile::Standard);
        assert_eq!(options.interval_ms, 10_000);
        assert_eq!(options.poll_interval, Duration::from_millis(10));

        let mut schedule = config.schedule.clone();
        schedule.profile = PublishProfile::Compact;
        let compact = SchedulerOptions::from_config(&schedule);
        assert_eq!(compact.interval_ms, 1_000);
        assert_eq!(compact.compact_topic, "sensor/data");
    }
}
