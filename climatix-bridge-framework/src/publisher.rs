//! MQTT publisher.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Destination for outbound MQTT messages.
///
/// [`Publisher`] is the broker-backed implementation; [`crate::testing::RecordingSink`]
/// keeps messages in memory.
pub trait MessageSink: Send + Sync {
    /// Publish a raw payload.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe to a topic filter.
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<()>> + Send;

    /// Serialize `value` as JSON and publish it.
    fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
        retain: bool,
    ) -> impl Future<Output = Result<()>> + Send {
        let payload = serde_json::to_vec(value).map_err(BridgeError::from);
        async move { self.publish(topic, payload?, retain).await }
    }
}

/// Publisher for sending messages to the MQTT broker.
///
/// Wraps a `rumqttc` client and remembers every subscription so the event
/// loop can restore them after a reconnect.
#[derive(Clone)]
pub struct Publisher {
    client: AsyncClient,
    qos: QoS,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(client: AsyncClient, qos: QoS) -> Self {
        Self {
            client,
            qos,
            subscriptions: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Topic filters subscribed so far.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Queue a publish without waiting for channel capacity.
    ///
    /// Used from the event loop task, which must never block on its own
    /// request channel.
    pub fn try_publish(&self, topic: &str, payload: impl Into<Vec<u8>>, retain: bool) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, retain, payload)
            .map_err(|e| BridgeError::publish(topic, e))
    }

    /// Re-issue every recorded subscription. Returns the number queued.
    pub fn resubscribe_all(&self) -> usize {
        let mut queued = 0;

        for topic in self.subscriptions() {
            match self.client.try_subscribe(topic.clone(), self.qos) {
                Ok(()) => queued += 1,
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Failed to restore subscription");
                }
            }
        }

        queued
    }

    /// Disconnect from the broker.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

impl MessageSink for Publisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .publish(topic, self.qos, retain, payload)
            .await
            .map_err(|e| BridgeError::publish(topic, e))
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscriptions.insert(topic.to_string());
        }

        self.client
            .subscribe(topic, self.qos)
            .await
            .map_err(|e| BridgeError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }
}

/// Statistics from a batch of publishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successful publishes.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Record the outcome of one publish.
    pub fn record<T>(&mut self, result: &Result<T>) {
        match result {
            Ok(_) => self.success += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Add another batch to this one.
    pub fn merge(&mut self, other: PublishStats) {
        self.success += other.success;
        self.failed += other.failed;
    }

    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.success as f64 / self.total() as f64) * 100.0
        }
    }
}
