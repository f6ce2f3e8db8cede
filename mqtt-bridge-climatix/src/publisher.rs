//! Publishing of entity discovery, state and attributes.

use serde::Serialize;

use climatix_bridge_framework::{MessageSink, Result};

use crate::classifier::Entity;
use crate::discovery::DiscoveryBuilder;
use crate::registry::EntityRegistry;

/// JSON published on an item's `attributes` topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemAttributes<'a> {
    pub page: &'a str,
    pub label: &'a str,
    pub unit: Option<&'a str>,
    #[serde(rename = "type")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_index: Option<&'a str>,
}

impl<'a> ItemAttributes<'a> {
    pub fn of(entity: &'a Entity) -> Self {
        let item = &entity.item;
        let options = item.option_labels();

        Self {
            page: &entity.page,
            label: &item.label,
            unit: item.unit.as_deref(),
            kind: item.kind.code(),
            options,
            index: options
                .and(item.value.as_ref())
                .and_then(|value| value.as_index()),
            write_index: item.write_index(),
        }
    }
}

/// Publishes entities of one HMI through a [`MessageSink`].
pub struct EntityPublisher<S: MessageSink> {
    sink: S,
    discovery: DiscoveryBuilder,
    retain_state: bool,
}

impl<S: MessageSink> EntityPublisher<S> {
    pub fn new(sink: S, discovery: DiscoveryBuilder, retain_state: bool) -> Self {
        Self {
            sink,
            discovery,
            retain_state,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn discovery(&self) -> &DiscoveryBuilder {
        &self.discovery
    }

    /// Publish the retained discovery config if it is new or changed.
    ///
    /// Returns `true` if a message was sent.
    pub async fn publish_discovery(
        &self,
        registry: &mut EntityRegistry,
        entity: &Entity,
    ) -> Result<bool> {
        let topic = self.discovery.topic(entity);
        let payload = serde_json::to_vec(&self.discovery.payload(entity))?;

        if !registry.needs_discovery(&topic, &payload) {
            return Ok(false);
        }

        self.sink.publish(&topic, payload.clone(), true).await?;
        registry.record_discovery(topic, payload);

        tracing::debug!(
            page = %entity.page,
            item = %entity.key(),
            component = entity.kind.component(),
            "Published discovery"
        );
        Ok(true)
    }

    /// Publish the current value. Returns `false` if the item has none.
    pub async fn publish_state(&self, entity: &Entity) -> Result<bool> {
        let Some(payload) = entity.item.state_payload() else {
            tracing::debug!(page = %entity.page, item = %entity.key(), "No value for item");
            return Ok(false);
        };

        let topic = self
            .discovery
            .topics()
            .item_topics(&entity.page, entity.key().as_str())
            .state;
        self.sink
            .publish(&topic, payload.into_bytes(), self.retain_state)
            .await?;
        Ok(true)
    }

    /// Publish the retained attribute JSON.
    pub async fn publish_attributes(&self, entity: &Entity) -> Result<()> {
        let topic = self
            .discovery
            .topics()
            .item_topics(&entity.page, entity.key().as_str())
            .attributes;
        self.sink
            .publish_json(&topic, &ItemAttributes::of(entity), true)
            .await
    }

    /// Subscribe to the command topic of a writable entity.
    pub async fn subscribe_commands(&self, entity: &Entity) -> Result<String> {
        let topic = self
            .discovery
            .topics()
            .item_topics(&entity.page, entity.key().as_str())
            .command;
        self.sink.subscribe(&topic).await?;
        Ok(topic)
    }
}
