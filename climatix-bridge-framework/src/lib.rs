//! Climatix Bridge Framework
//!
//! Common abstractions for bridges that poll a device and republish its
//! values over MQTT.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading, normalization and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Publisher`] for publishing to the MQTT broker, behind the [`MessageSink`] trait
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] and [`BridgeHealth`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use climatix_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("/data/options.json");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))
//!         .await?
//!         .with_status_publishing();
//!
//!     // Spawn protocol-specific workers
//!     runner.spawn(my_worker(runner.publisher()));
//!
//!     // Run until Ctrl+C or SIGTERM
//!     runner.run_with_metadata(None).await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod health;
mod publisher;
mod runner;
mod status;
pub mod testing;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use health::{
    BridgeHealth, ErrorType, HealthSnapshot, OFFLINE_AFTER_FAILURES, PageLiveness, PageStatus,
};
pub use publisher::{MessageSink, PublishStats, Publisher};
pub use runner::{BridgeRunner, IncomingMessage, mqtt_options};
pub use status::{BridgeStatus, PAYLOAD_OFFLINE, PAYLOAD_ONLINE, StatusPublisher};

// Re-export commonly used types from climatix-common
pub use climatix_common::{LogFormat, LoggingConfig, MqttConfig, TopicBuilder};
