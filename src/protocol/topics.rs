//! Topic namespace construction
//!
//! Every topic of one device shares the base path
//! `sensors/<deviceType>/<deviceId>/`. Data goes to one leaf per channel and
//! commands arrive on the single `forceUpdate` leaf.

/// Root segment of every device topic
pub const TOPIC_ROOT: &str = "sensors";
/// Leaf reserved for the force-update command
pub const COMMAND_LEAF: &str = "forceUpdate";

/// All topics derived for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    base: String,
    channel_topics: Vec<String>,
    command_topic: String,
}

impl TopicNamespace {
    /// Base path, including the trailing separator
    pub fn base_topic(&self) -> &str {
        &self.base
    }

    /// One topic per channel, in the order the channel names were given
    pub fn channel_topics(&self) -> &[String] {
        &self.channel_topics
    }

    /// Topic for a channel by name, if it is part of this namespace
    pub fn channel_topic(&self, channel_name: &str) -> Option<&str> {
        self.channel_topics
            .iter()
            .find(|topic| topic.strip_prefix(&self.base) == Some(channel_name))
            .map(String::as_str)
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    /// Subscription list issued on every session start: channel topics, the
    /// diagnostic wildcards, then the command topic
    pub fn subscriptions(&self, diagnostic_topics: &[String]) -> Vec<String> {
        let mut topics = self.channel_topics.clone();
        topics.extend(diagnostic_topics.iter().cloned());
        topics.push(self.command_topic.clone());
        topics
    }
}

/// Derive the topic namespace for a device (pure)
pub fn build_topics<S: AsRef<str>>(
    device_type: &str,
    identity: &str,
    channel_names: &[S],
) -> TopicNamespace {
    let base = format!("{TOPIC_ROOT}/{device_type}/{identity}/");
    let channel_topics = channel_names
        .iter()
        .map(|name| format!("{base}{}", name.as_ref()))
        .collect();
    let command_topic = format!("{base}{COMMAND_LEAF}");

    TopicNamespace {
        base,
        channel_topics,
        command_topic,
    }
}

/// Command topic of an arbitrary device, as used by remote controllers
pub fn command_topic_for(device_type: &str, identity: &str) -> String {
    format!("{TOPIC_ROOT}/{device_type}/{identity}/{COMMAND_LEAF}")
}
