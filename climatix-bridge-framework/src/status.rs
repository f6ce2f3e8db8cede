//! Bridge status reporting.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::MessageSink;

/// Availability payload for a running bridge.
pub const PAYLOAD_ONLINE: &str = "online";

/// Availability payload for a stopped bridge (also the last will).
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "climatix").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running" or "offline").
    pub status: String,
    /// Additional metadata (bridge-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "running".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "offline".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish this status as retained JSON to `topic`.
    pub async fn publish<S: MessageSink>(&self, sink: &S, topic: &str) -> Result<()> {
        sink.publish_json(topic, self, true).await
    }
}

/// Helper to publish availability and bridge status on startup and shutdown.
pub struct StatusPublisher<S: MessageSink> {
    sink: S,
    bridge_name: String,
    version: String,
    availability_topic: String,
    status_topic: String,
}

impl<S: MessageSink> StatusPublisher<S> {
    /// Create a new status publisher.
    pub fn new(
        sink: S,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
        availability_topic: impl Into<String>,
        status_topic: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            bridge_name: bridge_name.into(),
            version: version.into(),
            availability_topic: availability_topic.into(),
            status_topic: status_topic.into(),
        }
    }

    /// Publish `online` and a "running" status with optional metadata.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        self.sink
            .publish(&self.availability_topic, PAYLOAD_ONLINE.into(), true)
            .await?;

        let mut status = BridgeStatus::running(&self.bridge_name, &self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        status.publish(&self.sink, &self.status_topic).await
    }

    /// Publish `offline` and an "offline" status.
    pub async fn publish_offline(&self) -> Result<()> {
        self.sink
            .publish(&self.availability_topic, PAYLOAD_OFFLINE.into(), true)
            .await?;

        BridgeStatus::offline(&self.bridge_name, &self.version)
            .publish(&self.sink, &self.status_topic)
            .await
    }
}
