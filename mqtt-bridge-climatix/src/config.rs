//! Configuration for the Climatix bridge.
//!
//! The bridge reads the Home Assistant add-on options file (`/data/options.json`
//! by default). Plain JSON is valid JSON5, so hand-written JSON5 files work too.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use climatix_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, MqttConfig};
use climatix_common::{DEFAULT_BASE_TOPIC, DEFAULT_DISCOVERY_PREFIX, TopicBuilder, is_valid_page_id};

use crate::classifier::Profile;
use crate::discovery::DiscoveryBuilder;
use crate::hmi::HmiSettings;
use crate::poller::PollerSettings;

/// Default options file of the add-on.
pub const DEFAULT_CONFIG_PATH: &str = "/data/options.json";

/// Shortest allowed poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 30;

/// Pages polled when none are configured.
pub const DEFAULT_PAGES: [&str; 3] = ["HMI00001.cgi", "HMI65000.cgi", "HMI00033.cgi"];

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("device_host is required")]
    MissingHost,
    #[error("No pages to poll")]
    NoPages,
    #[error("Invalid page id '{0}' (expected NAME.cgi)")]
    InvalidPage(String),
    #[error("Pages '{0}' and '{1}' differ only in case")]
    PageCaseCollision(String, String),
    #[error("http_timeout_secs ({timeout}) must be between 1 and poll_interval ({interval}) exclusive")]
    Timeout { timeout: u64, interval: u64 },
    #[error("mqtt.host is required")]
    MissingMqttHost,
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimatixBridgeConfig {
    /// HMI base URL, e.g. `http://192.168.1.50`. A bare host gets `http://`.
    #[serde(default)]
    pub device_host: String,

    /// HMI basic auth user.
    #[serde(default)]
    pub username: String,

    /// HMI basic auth password.
    #[serde(default)]
    pub password: String,

    /// Seconds between poll cycles (at least 30).
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Root of state topics.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,

    /// Home Assistant discovery prefix.
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// `monitor` or `all`.
    #[serde(default)]
    pub profile: Profile,

    /// Pages to poll; defaults to [`DEFAULT_PAGES`] when empty.
    #[serde(default)]
    pub include_pages: Vec<String>,

    /// MQTT broker settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Index into the HMI language tables.
    #[serde(default)]
    pub language: usize,

    /// HMI request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Retain state messages.
    #[serde(default = "default_retain_state")]
    pub retain_state: bool,

    /// Device name shown in Home Assistant.
    #[serde(default)]
    pub device_name: Option<String>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_poll_interval() -> u64 {
    MIN_POLL_INTERVAL_SECS
}

fn default_base_topic() -> String {
    DEFAULT_BASE_TOPIC.to_string()
}

fn default_discovery_prefix() -> String {
    DEFAULT_DISCOVERY_PREFIX.to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_retain_state() -> bool {
    true
}

impl ClimatixBridgeConfig {
    /// Check a normalized configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.device_host.is_empty() {
            return Err(ConfigError::MissingHost);
        }

        if self.include_pages.is_empty() {
            return Err(ConfigError::NoPages);
        }

        if let Some(page) = self.include_pages.iter().find(|p| !is_valid_page_id(p)) {
            return Err(ConfigError::InvalidPage(page.clone()));
        }

        // Discovery object ids use the lowercased page stem
        for (i, page) in self.include_pages.iter().enumerate() {
            if let Some(other) = self.include_pages[i + 1..]
                .iter()
                .find(|other| other.eq_ignore_ascii_case(page))
            {
                return Err(ConfigError::PageCaseCollision(page.clone(), other.clone()));
            }
        }

        if self.http_timeout_secs == 0 || self.http_timeout_secs >= self.poll_interval {
            return Err(ConfigError::Timeout {
                timeout: self.http_timeout_secs,
                interval: self.poll_interval,
            });
        }

        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::MissingMqttHost);
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Name of the Home Assistant device.
    pub fn device_display_name(&self) -> String {
        match self.device_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Benekov @ {}", self.device_host),
        }
    }

    /// Settings for the HMI client.
    pub fn hmi_settings(&self) -> HmiSettings {
        HmiSettings {
            base_url: self.device_host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            language: self.language,
        }
    }

    /// Discovery builder for this device.
    pub fn discovery_builder(&self) -> DiscoveryBuilder {
        DiscoveryBuilder::new(
            &self.discovery_prefix,
            &self.device_host,
            self.device_display_name(),
            self.topics(),
        )
    }

    /// Settings for the poll loop.
    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            pages: self.include_pages.clone(),
            profile: self.profile,
            interval: self.poll_interval(),
            health_topic: self.topics().health_topic(),
        }
    }
}

impl BridgeConfig for ClimatixBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn topics(&self) -> TopicBuilder {
        TopicBuilder::new(&self.base_topic, &self.device_host)
    }

    fn normalize(&mut self) {
        let host = self.device_host.trim().trim_end_matches('/');
        self.device_host = if host.is_empty() || host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };

        if self.poll_interval < MIN_POLL_INTERVAL_SECS {
            tracing::warn!(
                poll_interval = self.poll_interval,
                min = MIN_POLL_INTERVAL_SECS,
                "poll_interval below minimum, clamping"
            );
            self.poll_interval = MIN_POLL_INTERVAL_SECS;
        }

        let base_topic = self.base_topic.trim().trim_matches('/');
        self.base_topic = if base_topic.is_empty() {
            default_base_topic()
        } else {
            base_topic.to_string()
        };

        let prefix = self.discovery_prefix.trim().trim_matches('/');
        self.discovery_prefix = if prefix.is_empty() {
            default_discovery_prefix()
        } else {
            prefix.to_string()
        };

        let mut pages: Vec<String> = Vec::new();
        for page in self.include_pages.iter().map(|p| p.trim()) {
            if !page.is_empty() && !pages.iter().any(|p| p == page) {
                pages.push(page.to_string());
            }
        }
        if pages.is_empty() {
            pages = DEFAULT_PAGES.iter().map(|p| p.to_string()).collect();
        }
        self.include_pages = pages;
    }

    fn validate(&self) -> climatix_bridge_framework::Result<()> {
        self.check()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addon_options() {
        let json = r#"{
            "device_host": "http://192.168.1.50",
            "username": "admin",
            "password": "secret",
            "poll_interval": 60,
            "base_topic": "benekov",
            "discovery_prefix": "homeassistant",
            "profile": "all",
            "include_pages": ["HMI00001.cgi", "HMI00002.cgi"],
            "mqtt": { "host": "core-mosquitto", "port": 1883, "username": "mqtt", "password": "pw" }
        }"#;

        let config = ClimatixBridgeConfig::from_json5(json).unwrap();
        assert_eq!(config.profile, Profile::All);
        assert_eq!(config.poll_interval, 60);
        assert_eq!(config.include_pages, vec!["HMI00001.cgi", "HMI00002.cgi"]);
        assert_eq!(config.mqtt.credentials(), Some(("mqtt", "pw")));
        assert_eq!(config.http_timeout_secs, 10);
        assert!(config.retain_state);
        assert_eq!(config.language, 0);
    }

    #[test]
    fn test_defaults_and_clamping() {
        let config = ClimatixBridgeConfig::from_json5(
            r#"{ device_host: "192.168.1.50/", poll_interval: 5 }"#,
        )
        .unwrap();

        assert_eq!(config.device_host, "http://192.168.1.50");
        assert_eq!(config.poll_interval, 30);
        assert_eq!(config.profile, Profile::Monitor);
        assert_eq!(config.base_topic, "benekov");
        assert_eq!(config.discovery_prefix, "homeassistant");
        assert_eq!(config.include_pages, DEFAULT_PAGES.to_vec());
        assert_eq!(config.mqtt.host, "core-mosquitto");
        assert_eq!(config.device_display_name(), "Benekov @ http://192.168.1.50");
    }

    #[test]
    fn test_single_page_is_respected() {
        let config = ClimatixBridgeConfig::from_json5(
            r#"{ device_host: "http://hmi", include_pages: ["HMI00001.cgi", " ", "HMI00001.cgi"] }"#,
        )
        .unwrap();
        assert_eq!(config.include_pages, vec!["HMI00001.cgi"]);
    }

    #[test]
    fn test_missing_host() {
        let result = ClimatixBridgeConfig::from_json5(r#"{ username: "admin" }"#);
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_invalid_page() {
        let mut config: ClimatixBridgeConfig =
            json5::from_str(r#"{ device_host: "http://hmi", include_pages: ["../etc/passwd"] }"#)
                .unwrap();
        config.normalize();
        assert_eq!(
            config.check(),
            Err(ConfigError::InvalidPage("../etc/passwd".to_string()))
        );
    }

    #[test]
    fn test_pages_differing_in_case_are_rejected() {
        let mut config: ClimatixBridgeConfig = json5::from_str(
            r#"{ device_host: "http://hmi", include_pages: ["HMI00001.cgi", "hmi00001.cgi"] }"#,
        )
        .unwrap();
        config.normalize();
        assert_eq!(
            config.check(),
            Err(ConfigError::PageCaseCollision(
                "HMI00001.cgi".to_string(),
                "hmi00001.cgi".to_string()
            ))
        );
    }

    #[test]
    fn test_timeout_must_be_below_interval() {
        let mut config: ClimatixBridgeConfig =
            json5::from_str(r#"{ device_host: "http://hmi", http_timeout_secs: 30 }"#).unwrap();
        config.normalize();
        assert!(matches!(config.check(), Err(ConfigError::Timeout { .. })));

        config.poll_interval = 31;
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_topics_and_settings() {
        let config = ClimatixBridgeConfig::from_json5(
            r#"{ device_host: "http://hmi.local", base_topic: "/boiler/", device_name: "Kotel", language: 1 }"#,
        )
        .unwrap();

        assert_eq!(config.base_topic, "boiler");
        assert_eq!(config.topics().availability_topic(), "boiler/http_hmi_local/status");
        assert_eq!(config.device_display_name(), "Kotel");

        let settings = config.hmi_settings();
        assert_eq!(settings.base_url, "http://hmi.local");
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.language, 1);

        let poller = config.poller_settings();
        assert_eq!(poller.interval, Duration::from_secs(30));
        assert_eq!(poller.health_topic, "boiler/http_hmi_local/bridge/health");
        assert_eq!(config.discovery_builder().device().name, "Kotel");
    }

    #[test]
    fn test_monitor_single_page_example() {
        let config = ClimatixBridgeConfig::from_json5(
            r#"{
                device_host: "http://192.168.1.50",
                profile: "monitor",
                poll_interval: 30,
                include_pages: ["HMI00001.cgi"],
            }"#,
        )
        .unwrap();

        let settings = config.poller_settings();
        assert_eq!(settings.pages, vec!["HMI00001.cgi"]);
        assert_eq!(settings.profile, Profile::Monitor);
    }
}
