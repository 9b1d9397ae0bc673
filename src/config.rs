//! Configuration system for the sensor node
//!
//! Loaded from a TOML file. Secrets (Wi-Fi and broker passwords) are never
//! stored in the file; the file names environment variables that are read at
//! runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Main node configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub identity: IdentitySection,
    pub wifi: WifiSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub sensors: SensorsSection,
}

/// Device section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device type label, used as the second topic segment
    #[serde(default = "default_device_type")]
    pub device_type: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            device_type: default_device_type(),
        }
    }
}

fn default_device_type() -> String {
    "ESP8266".to_string()
}

/// Identity section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentitySection {
    /// File backing the persistent identity slot
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Regenerate the identity when the signed slot holds non-hex bytes
    #[serde(default = "default_true")]
    pub repair_invalid: bool,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            repair_invalid: true,
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("sensor-node.eeprom")
}

fn default_true() -> bool {
    true
}

/// Wi-Fi section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WifiSection {
    /// Network name, also reported in every envelope
    pub ssid: String,
    /// Environment variable containing the network password
    pub password_env: Option<String>,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Time allowed for the ConnAck before a handshake counts as failed
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Wildcard subscriptions kept for diagnostic visibility
    #[serde(default = "default_diagnostic_topics")]
    pub diagnostic_topics: Vec<String>,
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_diagnostic_topics() -> Vec<String> {
    vec!["sensors/#".to_string(), "home/#".to_string()]
}

/// Publish profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishProfile {
    /// One envelope per channel on the channel topic, every 10 s
    Standard,
    /// One combined reading on a fixed topic, every 1 s
    Compact,
}

impl PublishProfile {
    pub fn default_interval_ms(self) -> u64 {
        match self {
            PublishProfile::Standard => 10_000,
            PublishProfile::Compact => 1_000,
        }
    }
}

/// Schedule section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSection {
    #[serde(default = "default_profile")]
    pub profile: PublishProfile,
    /// Overrides the profile's default interval
    pub interval_ms: Option<u64>,
    /// Pause between scheduler ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Topic used by the compact profile
    #[serde(default = "default_compact_topic")]
    pub compact_topic: String,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            interval_ms: None,
            poll_interval_ms: default_poll_interval(),
            compact_topic: default_compact_topic(),
        }
    }
}

impl ScheduleSection {
    /// Effective publish interval
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
            .unwrap_or_else(|| self.profile.default_interval_ms())
    }
}

fn default_profile() -> PublishProfile {
    PublishProfile::Standard
}

fn default_poll_interval() -> u64 {
    10
}

fn default_compact_topic() -> String {
    "sensor/data".to_string()
}

/// Retry section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Delay between link status polls
    #[serde(default = "default_link_delay")]
    pub link_delay_ms: u64,
    /// Delay after a failed session handshake
    #[serde(default = "default_session_delay")]
    pub session_delay_ms: u64,
    /// Optional session backoff pattern applied before `session_delay_ms`
    #[serde(default)]
    pub backoff_pattern_ms: Vec<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            link_delay_ms: default_link_delay(),
            session_delay_ms: default_session_delay(),
            backoff_pattern_ms: Vec::new(),
        }
    }
}

fn default_link_delay() -> u64 {
    500
}

fn default_session_delay() -> u64 {
    5000
}

/// Broker reachability probe section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    #[serde(default = "default_probe_timeout")]
    pub timeout_ms: u64,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: default_probe_attempts(),
            timeout_ms: default_probe_timeout(),
        }
    }
}

fn default_probe_attempts() -> u32 {
    4
}

fn default_probe_timeout() -> u64 {
    1000
}

/// Sensor backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorBackend {
    Simulated,
    Sysfs,
}

/// Sensors section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorsSection {
    #[serde(default = "default_sensor_backend")]
    pub source: SensorBackend,
    /// Raw illuminance file (sysfs backend)
    #[serde(default = "default_light_path")]
    pub light_path: PathBuf,
    /// Millidegree temperature file (sysfs backend)
    #[serde(default = "default_temperature_path")]
    pub temperature_path: PathBuf,
}

impl Default for SensorsSection {
    fn default() -> Self {
        Self {
            source: default_sensor_backend(),
            light_path: default_light_path(),
            temperature_path: default_temperature_path(),
        }
    }
}

fn default_sensor_backend() -> SensorBackend {
    SensorBackend::Simulated
}

fn default_light_path() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0/in_illuminance_raw")
}

fn default_temperature_path() -> PathBuf {
    PathBuf::from("/sys/class/thermal/thermal_zone0/temp")
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device type: {0}")]
    InvalidDeviceType(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NodeConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_topic_segment(&self.device.device_type)?;

        Url::parse(&self.mqtt.broker_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "broker_url '{}' is not a valid URL: {e}",
                self.mqtt.broker_url
            ))
        })?;

        if self.schedule.interval_ms() == 0 {
            return Err(ConfigError::InvalidConfig(
                "schedule.interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry.session_delay_ms == 0 || self.retry.link_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry delays must be greater than 0".to_string(),
            ));
        }

        if self.probe.enabled && self.probe.attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "probe.attempts must be greater than 0 when the probe is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Wi-Fi password; an open network when no variable is configured
    pub fn get_wifi_password(&self) -> Result<String, ConfigError> {
        match &self.wifi.password_env {
            Some(name) => Self::get_env_var_required(name),
            None => Ok(String::new()),
        }
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.password_env.as_ref())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[wifi]
ssid = "test-net"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// A device type becomes a topic segment, so it must not contain separators
/// or wildcards
fn validate_topic_segment(segment: &str) -> Result<(), ConfigError> {
    if segment.is_empty() || segment.contains(['/', '+', '#']) {
        return Err(ConfigError::InvalidDeviceType(format!(
            "'{segment}' must be a non-empty topic segment without '/', '+' or '#'"
        )));
    }
    Ok(())
}
