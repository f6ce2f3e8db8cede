//! Bridge runner for lifecycle management.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use climatix_common::{TopicBuilder, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::status::{PAYLOAD_OFFLINE, PAYLOAD_ONLINE, StatusPublisher};
use crate::LoggingConfig;

/// Capacity of the MQTT client request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the inbound message channel.
const INCOMING_CHANNEL_CAPACITY: usize = 64;

/// Delay before the event loop retries after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long shutdown waits for the event loop to flush the last messages.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// A message received on one of the subscribed topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl IncomingMessage {
    /// Payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Bridge runner that manages the lifecycle of a bridge.
///
/// Handles:
/// - Logging initialization
/// - MQTT session setup with an `offline` last will
/// - Driving the MQTT event loop (reconnects, restoring subscriptions)
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C or SIGTERM
/// - Status publishing (optional)
///
/// # Example
///
/// ```ignore
/// use climatix_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("/data/options.json");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args)).await?;
///
///     let publisher = runner.publisher();
///     runner.spawn(async move {
///         // Worker logic here
///     });
///
///     runner.run_with_metadata(None).await
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Topic builder for the bridged device.
    topics: TopicBuilder,
    /// Publisher for outbound messages.
    publisher: Publisher,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher<Publisher>>,
    /// Task driving the MQTT event loop.
    event_loop: JoinHandle<()>,
    /// Inbound messages, until taken by a worker.
    incoming: Option<mpsc::Receiver<IncomingMessage>>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner with CLI args for log level override.
    ///
    /// This will:
    /// 1. Initialize logging based on config (with optional CLI override)
    /// 2. Create the MQTT client and spawn its event loop
    /// 3. Create the publisher
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        // Initialize logging with optional CLI override
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let topics = config.topics();
        let options = mqtt_options(&name, &config, &topics);

        tracing::info!(
            host = %config.mqtt().host,
            port = config.mqtt().port,
            client_id = %options.client_id(),
            "Connecting to MQTT broker"
        );

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let publisher = Publisher::new(client, QoS::AtLeastOnce);

        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
        let event_loop = tokio::spawn(drive_event_loop(
            eventloop,
            publisher.clone(),
            topics.availability_topic(),
            incoming_tx,
        ));

        Ok(Self {
            name,
            version,
            config,
            topics,
            publisher,
            status_publisher: None,
            event_loop,
            incoming: Some(incoming_rx),
            tasks: Vec::new(),
        })
    }

    /// Enable status publishing.
    ///
    /// When enabled, the runner will publish availability and bridge status
    /// on startup and shutdown.
    pub fn with_status_publishing(mut self) -> Self {
        self.status_publisher = Some(StatusPublisher::new(
            self.publisher.clone(),
            &self.name,
            &self.version,
            self.topics.availability_topic(),
            self.topics.bridge_status_topic(),
        ));
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get the topic builder.
    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Take the stream of inbound messages. Returns `None` after the first call.
    pub fn take_incoming(&mut self) -> Option<mpsc::Receiver<IncomingMessage>> {
        self.incoming.take()
    }

    /// Spawn a worker task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Run the bridge until Ctrl+C or SIGTERM is received.
    ///
    /// This will:
    /// 1. Publish "running" status with `metadata` (if enabled)
    /// 2. Wait for a shutdown signal
    /// 3. Abort all spawned tasks
    /// 4. Publish "offline" status (if enabled)
    /// 5. Disconnect from the broker
    pub async fn run_with_metadata(self, metadata: Option<serde_json::Value>) -> Result<()> {
        // Publish running status
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_running(metadata).await {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        shutdown_signal().await;

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        // Abort all tasks
        for task in &self.tasks {
            task.abort();
        }

        // Wait briefly for tasks to clean up
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Publish offline status
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_offline().await {
                tracing::warn!(error = %e, "Failed to publish offline status");
            }
        }

        if let Err(e) = self.publisher.disconnect().await {
            tracing::warn!(error = %e, "Error disconnecting from MQTT broker");
        }

        let mut event_loop = self.event_loop;
        if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, &mut event_loop)
            .await
            .is_err()
        {
            event_loop.abort();
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Build MQTT options for a bridge, including the `offline` last will.
pub fn mqtt_options<C: BridgeConfig>(name: &str, config: &C, topics: &TopicBuilder) -> MqttOptions {
    let mqtt = config.mqtt();
    let client_id = mqtt
        .client_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", name, topics.host_slug()));

    let mut options = MqttOptions::new(client_id, mqtt.host.clone(), mqtt.port);
    options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs.max(5)));

    if let Some((username, password)) = mqtt.credentials() {
        options.set_credentials(username, password);
    }

    options.set_last_will(LastWill::new(
        topics.availability_topic(),
        PAYLOAD_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));

    options
}

/// Poll the MQTT event loop until the client disconnects.
///
/// On every `ConnAck` the bridge is marked online again and recorded
/// subscriptions are restored; connection errors are retried after
/// [`RECONNECT_DELAY`].
async fn drive_event_loop(
    mut eventloop: EventLoop,
    publisher: Publisher,
    availability_topic: String,
    incoming: mpsc::Sender<IncomingMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!(code = ?ack.code, "Connected to MQTT broker");

                if let Err(e) = publisher.try_publish(&availability_topic, PAYLOAD_ONLINE, true) {
                    tracing::warn!(error = %e, "Failed to publish availability");
                }

                let restored = publisher.resubscribe_all();
                if restored > 0 {
                    tracing::debug!(subscriptions = restored, "Restored subscriptions");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = IncomingMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };

                if let Err(e) = incoming.try_send(message) {
                    tracing::warn!(topic = %publish.topic, error = %e, "Dropping inbound message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_secs = RECONNECT_DELAY.as_secs(),
                    "MQTT connection error"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Wait for Ctrl+C, or SIGTERM on Unix (sent by container supervisors).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = signal::ctrl_c() => {
                        if let Err(e) = result {
                            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                        }
                    }
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BridgeConfig, MqttConfig};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        mqtt: MqttConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl BridgeConfig for TestConfig {
        fn mqtt(&self) -> &MqttConfig {
            &self.mqtt
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn topics(&self) -> TopicBuilder {
            TopicBuilder::new("benekov", "http://10.0.0.5")
        }
    }

    #[test]
    fn test_mqtt_options() {
        let config = TestConfig::from_json5(
            r#"{ mqtt: { host: "broker", port: 1884, username: "u", password: "p" } }"#,
        )
        .unwrap();
        let topics = config.topics();

        let options = mqtt_options("climatix", &config, &topics);

        assert_eq!(options.client_id(), "climatix-http_10_0_0_5");
        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));

        let will = options.last_will().unwrap();
        assert_eq!(will.topic, "benekov/http_10_0_0_5/status");
        assert!(will.retain);
    }

    #[test]
    fn test_client_id_override() {
        let config =
            TestConfig::from_json5(r#"{ mqtt: { client_id: "boiler-bridge" } }"#).unwrap();
        let options = mqtt_options("climatix", &config, &config.topics());
        assert_eq!(options.client_id(), "boiler-bridge");
    }

    #[test]
    fn test_incoming_payload_str() {
        let message = IncomingMessage {
            topic: "t".to_string(),
            payload: b" 21.5 ".to_vec(),
        };
        assert_eq!(message.payload_str().trim(), "21.5");
    }
}
