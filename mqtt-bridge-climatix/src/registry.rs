//! Bookkeeping of published entities and command routing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::classifier::{Entity, EntityKind};
use crate::model::Item;

/// Discovery payloads already sent, keyed by discovery topic.
///
/// Owned by the poll loop.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    discovery: HashMap<String, Vec<u8>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `payload` differs from what was last sent on `topic`.
    pub fn needs_discovery(&self, topic: &str, payload: &[u8]) -> bool {
        self.discovery
            .get(topic)
            .is_none_or(|published| published.as_slice() != payload)
    }

    /// Remember a sent discovery payload.
    pub fn record_discovery(&mut self, topic: impl Into<String>, payload: Vec<u8>) {
        self.discovery.insert(topic.into(), payload);
    }

    /// Number of entities announced.
    pub fn len(&self) -> usize {
        self.discovery.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovery.is_empty()
    }
}

/// What a command topic writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTarget {
    pub page: String,
    pub item: Item,
    pub kind: EntityKind,
}

impl From<&Entity> for CommandTarget {
    fn from(entity: &Entity) -> Self {
        Self {
            page: entity.page.clone(),
            item: entity.item.clone(),
            kind: entity.kind,
        }
    }
}

/// Command topic to target table, written by the poll loop and read by the
/// command handler.
#[derive(Debug, Clone, Default)]
pub struct CommandTargets {
    inner: Arc<RwLock<HashMap<String, CommandTarget>>>,
}

impl CommandTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a target. Returns `true` if the topic is new.
    pub async fn upsert(&self, topic: impl Into<String>, target: CommandTarget) -> bool {
        self.inner.write().await.insert(topic.into(), target).is_none()
    }

    pub async fn get(&self, topic: &str) -> Option<CommandTarget> {
        self.inner.read().await.get(topic).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
