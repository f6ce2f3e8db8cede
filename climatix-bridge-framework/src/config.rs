//! Configuration traits and utilities.

use std::path::Path;

use climatix_common::TopicBuilder;
use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, normalization and validation, and access to the
/// common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use climatix_bridge_framework::{BridgeConfig, LoggingConfig, MqttConfig};
/// use climatix_common::TopicBuilder;
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub mqtt: MqttConfig,
///     pub logging: LoggingConfig,
///     pub device_host: String,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn topics(&self) -> TopicBuilder {
///         TopicBuilder::new("my", &self.device_host)
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the MQTT broker configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Topic builder for this bridge's device.
    fn topics(&self) -> TopicBuilder;

    /// Apply defaults and clamp out-of-range values.
    ///
    /// Called by [`load`](Self::load) before validation.
    fn normalize(&mut self) {}

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format (and therefore plain JSON). Calls
    /// [`normalize`](Self::normalize) and [`validate`](Self::validate) after
    /// loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json5(&content)
    }

    /// Parse, normalize and validate configuration from a JSON5 string.
    fn from_json5(content: &str) -> Result<Self> {
        let mut config: Self = json5::from_str(content)?;

        config.normalize();
        config.validate()?;

        Ok(config)
    }
}
