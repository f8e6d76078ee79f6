//! Bridge configuration.
//!
//! Loaded from a TOML file, then overridden from the environment so a
//! container deployment can run without a config file at all.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config_err;
use crate::error::Result;

/// Default values.
pub mod defaults {
    pub const MQTT_HOST: &str = "localhost";
    pub const MQTT_PORT: u16 = 1883;
    pub const MQTT_CLIENT_ID: &str = "zigmind";
    pub const KEEP_ALIVE_SECS: u64 = 60;
    pub const TOPIC_PREFIX: &str = "zigbee2mqtt";
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_HOST: &str = "ZIGMIND_MQTT_HOST";
    pub const MQTT_PORT: &str = "ZIGMIND_MQTT_PORT";
    pub const MQTT_USERNAME: &str = "ZIGMIND_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "ZIGMIND_MQTT_PASSWORD";
    pub const TOPIC_PREFIX: &str = "ZIGMIND_TOPIC_PREFIX";
    /// Set to `true` for JSON log lines
    pub const LOG_JSON: &str = "ZIGMIND_LOG_JSON";
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Broker host name
    pub host: String,
    /// Broker port
    pub port: u16,
    /// MQTT client id
    pub client_id: String,
    /// Username for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: defaults::MQTT_HOST.to_string(),
            port: defaults::MQTT_PORT,
            client_id: defaults::MQTT_CLIENT_ID.to_string(),
            username: None,
            password: None,
            keep_alive_secs: defaults::KEEP_ALIVE_SECS,
        }
    }
}

impl MqttSettings {
    pub fn full_broker_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Broker connection
    pub mqtt: MqttSettings,
    /// Zigbee2MQTT base topic
    pub topic_prefix: String,
    /// Request fresh values from every device once it has been built
    pub poll_on_start: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            topic_prefix: defaults::TOPIC_PREFIX.to_string(),
            poll_on_start: true,
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_err!("Failed to read {}: {}", path.display(), e))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields from `ZIGMIND_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::MQTT_HOST) {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup(env_vars::MQTT_PORT) {
            self.mqtt.port = port
                .parse()
                .map_err(|_| config_err!("{} is not a valid port: {}", env_vars::MQTT_PORT, port))?;
        }
        if let Some(username) = lookup(env_vars::MQTT_USERNAME) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup(env_vars::MQTT_PASSWORD) {
            self.mqtt.password = Some(password);
        }
        if let Some(prefix) = lookup(env_vars::TOPIC_PREFIX) {
            self.topic_prefix = prefix;
        }
        self.validate()
    }

    /// Check the invariants a runnable configuration needs.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            return Err(config_err!("mqtt.host must not be empty"));
        }
        if self.topic_prefix.trim().is_empty() {
            return Err(config_err!("topic_prefix must not be empty"));
        }
        if self.topic_prefix.ends_with('/') {
            return Err(config_err!(
                "topic_prefix must not end with '/': {}",
                self.topic_prefix
            ));
        }
        Ok(())
    }
}

/// Whether JSON log output was requested through the environment.
pub fn json_logging_requested() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}
