//! MQTT bridge for Siemens Climatix HMI controllers.
//!
//! Polls the HMI pages of a Climatix controller, publishes values to MQTT
//! with Home Assistant discovery and forwards commands back to the HMI.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use climatix_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use mqtt_bridge_climatix::commands::CommandHandler;
use mqtt_bridge_climatix::config::{ClimatixBridgeConfig, DEFAULT_CONFIG_PATH};
use mqtt_bridge_climatix::hmi::HmiClient;
use mqtt_bridge_climatix::poller::HmiPoller;
use mqtt_bridge_climatix::publisher::EntityPublisher;
use mqtt_bridge_climatix::registry::CommandTargets;

/// Pending page refreshes requested by writes.
const REFRESH_CHANNEL_CAPACITY: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default(DEFAULT_CONFIG_PATH);

    let config = ClimatixBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let runner = BridgeRunner::new_with_args("climatix", config, Some(&args))
        .await
        .context("Failed to start bridge")?;
    let mut runner = runner.with_status_publishing();

    let config = runner.config().clone();
    let topics = runner.topics().clone();

    let client = HmiClient::new(config.hmi_settings()).context("Failed to create HMI client")?;
    let languages = client.load_languages().await;
    tracing::info!(
        host = %config.device_host,
        entries = languages.len(),
        "Loaded HMI language tables"
    );
    let client = Arc::new(client.with_languages(languages.clone()));

    let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_CHANNEL_CAPACITY);
    let targets = CommandTargets::new();

    let publisher = EntityPublisher::new(
        runner.publisher(),
        config.discovery_builder(),
        config.retain_state,
    );
    let poller = HmiPoller::new(
        client.clone(),
        publisher,
        targets.clone(),
        languages,
        config.poller_settings(),
    )
    .with_refresh_requests(refresh_rx);

    if let Some(incoming) = runner.take_incoming() {
        let handler = CommandHandler::new(client, topics, targets, refresh_tx);
        runner.spawn(handler.run(incoming));
    }

    runner.spawn(poller.run());

    let metadata = serde_json::json!({
        "device_host": config.device_host,
        "profile": config.profile.as_str(),
        "pages": config.include_pages,
        "poll_interval_secs": config.poll_interval,
    });

    runner
        .run_with_metadata(Some(metadata))
        .await
        .context("Bridge stopped with an error")
}
