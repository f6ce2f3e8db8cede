//! Climatix Common Library
//!
//! Shared types and utilities for the Climatix HMI to MQTT bridge:
//!
//! - [`config`] - MQTT and logging configuration, JSON5 loading
//! - [`topics`] - MQTT topic builders and Home Assistant discovery topics
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use topics::{
    DEFAULT_BASE_TOPIC, DEFAULT_DISCOVERY_PREFIX, ItemTopics, ParsedItemTopic, TopicBuilder,
    discovery_topic, is_valid_page_id, page_stem, slugify,
};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
