//! In-memory message sink for tests and dry runs.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{BridgeError, Result};
use crate::publisher::MessageSink;

/// A message captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl RecordedMessage {
    /// Payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<RecordedMessage>,
    subscriptions: Vec<String>,
    fail_topics: Vec<String>,
}

/// [`MessageSink`] that records everything instead of talking to a broker.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to topics starting with `prefix` fail.
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.lock().fail_topics.push(prefix.into());
    }

    /// All published messages in order.
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.lock().messages.clone()
    }

    /// Messages published to exactly `topic`.
    pub fn messages_on(&self, topic: &str) -> Vec<RecordedMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Most recent message on `topic`.
    pub fn last_on(&self, topic: &str) -> Option<RecordedMessage> {
        self.messages_on(topic).pop()
    }

    /// Subscribed topic filters in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    /// Forget all recorded messages (subscriptions are kept).
    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageSink for RecordingSink {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_topics.iter().any(|p| topic.starts_with(p.as_str())) {
            return Err(BridgeError::publish(topic, "rejected by recording sink"));
        }
        inner.messages.push(RecordedMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut inner = self.lock();
        if !inner.subscriptions.iter().any(|t| t == topic) {
            inner.subscriptions.push(topic.to_string());
        }
        Ok(())
    }
}
