//! Configuration loaded from TOML.

use std::time::Duration;

use rc_link_types::{DEFAULT_DEVICE_NAME, SERIAL_PORT_PROFILE_UUID};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LinkError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub bluez: BluezConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate and convert the `[link]` section.
    pub fn link_policy(&self) -> Result<LinkPolicy, LinkError> {
        self.link.to_policy()
    }
}

/// Target device and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            service_uuid: default_service_uuid(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl LinkConfig {
    fn to_policy(&self) -> Result<LinkPolicy, LinkError> {
        if self.device_name.trim().is_empty() {
            return Err(LinkError::Config("link.device_name is empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(LinkError::Config(
                "link.max_attempts must be at least 1".to_string(),
            ));
        }
        let service_uuid: Uuid = self.service_uuid.parse().map_err(|e| {
            LinkError::Config(format!("invalid link.service_uuid {:?}: {e}", self.service_uuid))
        })?;
        Ok(LinkPolicy {
            device_name: self.device_name.clone(),
            service_uuid,
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        })
    }
}

/// BlueZ backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BluezConfig {
    /// Adapter name such as "hci0". The default adapter when unset.
    #[serde(default)]
    pub adapter: Option<String>,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resolved connection policy used by the link manager.
///
/// Retries are a fixed count with a fixed delay between attempts; there is
/// no jitter and no growth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPolicy {
    pub device_name: String,
    pub service_uuid: Uuid,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            service_uuid: SERIAL_PORT_PROFILE_UUID,
            max_attempts: default_max_attempts(),
            retry_backoff: Duration::from_millis(default_retry_backoff_ms()),
        }
    }
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_service_uuid() -> String {
    SERIAL_PORT_PROFILE_UUID.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("device_name = \"HC-05\""));
        assert!(toml_str.contains("max_attempts = 3"));
    }

    #[test]
    fn default_policy_is_three_attempts_five_seconds() {
        let policy = Config::default().link_policy().unwrap();
        assert_eq!(policy, LinkPolicy::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retry_backoff, Duration::from_secs(5));
        assert_eq!(policy.service_uuid, SERIAL_PORT_PROFILE_UUID);
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[link]
device_name = "HC-06"
service_uuid = "00001101-0000-1000-8000-00805F9B34FB"
max_attempts = 5
retry_backoff_ms = 2000

[bluez]
adapter = "hci1"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bluez.adapter.as_deref(), Some("hci1"));
        assert_eq!(config.logging.level, "debug");

        let policy = config.link_policy().unwrap();
        assert_eq!(policy.device_name, "HC-06");
        assert_eq!(policy.service_uuid, SERIAL_PORT_PROFILE_UUID);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retry_backoff, Duration::from_secs(2));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str("[link]\nmax_attempts = 1\n").unwrap();
        let policy = config.link_policy().unwrap();
        assert_eq!(policy.device_name, "HC-05");
        assert_eq!(policy.max_attempts, 1);
        assert!(config.bluez.adapter.is_none());
    }

    #[test]
    fn rejects_invalid_link_settings() {
        let zero: Config = toml::from_str("[link]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(zero.link_policy(), Err(LinkError::Config(_))));

        let bad_uuid: Config = toml::from_str("[link]\nservice_uuid = \"spp\"\n").unwrap();
        assert!(matches!(bad_uuid.link_policy(), Err(LinkError::Config(_))));

        let blank: Config = toml::from_str("[link]\ndevice_name = \" \"\n").unwrap();
        assert!(matches!(blank.link_policy(), Err(LinkError::Config(_))));
    }
}
