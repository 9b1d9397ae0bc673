//! Wire formats of the sensor node
//!
//! Field names and casing of [`TelemetryEnvelope`] are consumed verbatim by
//! the dashboard and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The only recognised inbound command
pub const UPDATE_COMMAND: &str = "UPDATE";

/// Sensor channels published by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Light,
    Temperature,
}

impl Channel {
    /// Publish order of the channels
    pub const ALL: [Channel; 2] = [Channel::Light, Channel::Temperature];

    /// Channel name as used in topics and in `dataType`
    pub fn name(self) -> &'static str {
        match self {
            Channel::Light => "Licht",
            Channel::Temperature => "Temperatur",
        }
    }

    pub fn names() -> [&'static str; 2] {
        Self::ALL.map(Channel::name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sensor value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingValue {
    /// Raw ADC counts
    Raw(i32),
    /// Degrees Celsius
    Celsius(f32),
}

impl fmt::Display for ReadingValue {
    /// Integers are rendered as-is, temperatures with two decimals
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Raw(value) => write!(f, "{value}"),
            ReadingValue::Celsius(value) => write!(f, "{value:.2}"),
        }
    }
}

/// Why a publish cycle ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLabel {
    #[serde(rename = "Command-Triggered Update")]
    CommandTriggered,
    #[serde(rename = "Regular Data Upload")]
    RegularUpload,
}

impl EventLabel {
    pub fn for_cycle(forced: bool) -> Self {
        if forced {
            EventLabel::CommandTriggered
        } else {
            EventLabel::RegularUpload
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventLabel::CommandTriggered => "Command-Triggered Update",
            EventLabel::RegularUpload => "Regular Data Upload",
        }
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured body of one telemetry publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    pub event: EventLabel,
    pub topic: String,
    #[serde(rename = "clientType")]
    pub client_type: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "dataType")]
    pub data_type: String,
    #[serde(rename = "dataValue")]
    pub data_value: String,
    #[serde(rename = "WIFI SSID")]
    pub wifi_ssid: String,
}

impl TelemetryEnvelope {
    /// Compact JSON for the wire
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Indented JSON for the local diagnostic output
    pub fn to_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Combined reading of the compact profile, e.g.
/// `{"temperature":23.45,"light":512}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactReading {
    pub temperature: f64,
    pub light: i32,
}

impl CompactReading {
    /// Temperature is rounded to two decimals, matching the envelope rendering
    pub fn new(light: i32, temperature: f32) -> Self {
        Self {
            temperature: (f64::from(temperature) * 100.0).round() / 100.0,
            light,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Decoded inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish a reading immediately
    ForceUpdate,
    /// Anything else; accepted and ignored
    Unknown(String),
}

impl Command {
    /// Decode a plain-text payload; invalid UTF-8 is replaced, never rejected
    pub fn decode(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        if text == UPDATE_COMMAND {
            Command::ForceUpdate
        } else {
            Command::Unknown(text.into_owned())
        }
    }
}
