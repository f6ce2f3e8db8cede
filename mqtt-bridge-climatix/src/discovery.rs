//! Home Assistant MQTT discovery payloads.

use serde::Serialize;
use sha2::{Digest, Sha256};

use climatix_bridge_framework::{PAYLOAD_OFFLINE, PAYLOAD_ONLINE};
use climatix_common::{TopicBuilder, discovery_topic, page_stem};

use crate::classifier::{Entity, EntityKind};

pub const MANUFACTURER: &str = "Benekov/Siemens";
pub const MODEL: &str = "Climatix HMI";

/// Stable unique id of an entity: SHA-256 of `host|page|key` plus a kind suffix.
///
/// # Example
/// ```
/// use mqtt_bridge_climatix::classifier::EntityKind;
/// use mqtt_bridge_climatix::discovery::unique_id;
///
/// let id = unique_id("http://hmi", "HMI00001.cgi", "o044", EntityKind::Number);
/// assert!(id.ends_with("-num"));
/// assert_eq!(id.len(), 64 + 4);
/// ```
pub fn unique_id(host: &str, page: &str, key: &str, kind: EntityKind) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", host, page, key).as_bytes());
    format!("{}{}", hex::encode(digest), kind.unique_id_suffix())
}

/// `device` block shared by every entity of one HMI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

/// Discovery config of a sensor, number or select.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    pub json_attributes_topic: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub icon: String,
    pub device: DeviceInfo,
}

/// Builds discovery topics and payloads for one HMI.
#[derive(Debug, Clone)]
pub struct DiscoveryBuilder {
    prefix: String,
    node_id: String,
    host: String,
    topics: TopicBuilder,
    device: DeviceInfo,
}

impl DiscoveryBuilder {
    pub fn new(
        prefix: impl Into<String>,
        host: impl Into<String>,
        device_name: impl Into<String>,
        topics: TopicBuilder,
    ) -> Self {
        let host_slug = topics.host_slug().to_string();

        Self {
            prefix: prefix.into(),
            node_id: format!("climatix_{}", host_slug),
            host: host.into(),
            device: DeviceInfo {
                identifiers: vec![format!("climatix-{}", host_slug)],
                name: device_name.into(),
                manufacturer: MANUFACTURER.to_string(),
                model: MODEL.to_string(),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            topics,
        }
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// `{prefix}/{component}/climatix_{host}/{page}_{key}/config`.
    pub fn topic(&self, entity: &Entity) -> String {
        let object_id = format!(
            "{}_{}",
            page_stem(&entity.page).to_lowercase(),
            entity.key()
        );
        discovery_topic(
            &self.prefix,
            entity.kind.component(),
            &self.node_id,
            &object_id,
        )
    }

    pub fn payload(&self, entity: &Entity) -> DiscoveryPayload {
        let item = &entity.item;
        let topics = self.topics.item_topics(&entity.page, item.key.as_str());

        let name = if item.label.is_empty() {
            item.key.to_string()
        } else {
            item.label.clone()
        };

        let (command_topic, options) = match entity.kind {
            EntityKind::Sensor => (None, None),
            EntityKind::Number => (Some(topics.command), None),
            EntityKind::Select => (
                Some(topics.command),
                item.option_labels().map(<[String]>::to_vec),
            ),
        };

        DiscoveryPayload {
            name,
            unique_id: unique_id(&self.host, &entity.page, item.key.as_str(), entity.kind),
            state_topic: topics.state,
            command_topic,
            json_attributes_topic: topics.attributes,
            availability_topic: self.topics.availability_topic(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
            unit_of_measurement: match entity.kind {
                EntityKind::Select => None,
                _ => item.unit.clone(),
            },
            options,
            icon: entity.kind.icon().to_string(),
            device: self.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Access, Item, ItemKey, ValueKind};

    fn builder() -> DiscoveryBuilder {
        DiscoveryBuilder::new(
            "homeassistant",
            "http://192.168.1.50",
            "Benekov @ http://192.168.1.50",
            TopicBuilder::new("benekov", "http://192.168.1.50"),
        )
    }

    fn entity(key: &str, kind: EntityKind) -> Entity {
        let mut item = Item::generic(ItemKey::parse(key).unwrap(), None);
        item.label = "Boiler state".to_string();
        item.unit = Some("°C".to_string());
        if kind != EntityKind::Sensor {
            item.access = Access::Writable {
                write_index: "val:0x1".to_string(),
            };
        }
        if kind == EntityKind::Select {
            item.kind = ValueKind::Enumerated;
            item.options = Some(vec!["Off".to_string(), "On".to_string()]);
        }
        Entity {
            page: "HMI00001.cgi".to_string(),
            item,
            kind,
        }
    }

    #[test]
    fn test_unique_id_is_stable() {
        let a = unique_id("http://hmi", "HMI00001.cgi", "o044", EntityKind::Sensor);
        let b = unique_id("http://hmi", "HMI00001.cgi", "o044", EntityKind::Sensor);
        let c = unique_id("http://hmi", "HMI00001.cgi", "o045", EntityKind::Sensor);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sensor_payload() {
        let builder = builder();
        let entity = entity("o075", EntityKind::Sensor);

        assert_eq!(
            builder.topic(&entity),
            "homeassistant/sensor/climatix_http_192_168_1_50/hmi00001_o075/config"
        );

        let payload = builder.payload(&entity);
        assert_eq!(
            payload.state_topic,
            "benekov/http_192_168_1_50/HMI00001/o075/state"
        );
        assert!(payload.command_topic.is_none());
        assert_eq!(payload.availability_topic, "benekov/http_192_168_1_50/status");
        assert_eq!(payload.unit_of_measurement.as_deref(), Some("°C"));
        assert_eq!(
            payload.device.identifiers,
            vec!["climatix-http_192_168_1_50".to_string()]
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("command_topic").is_none());
        assert!(json.get("options").is_none());
        assert_eq!(json["device"]["manufacturer"], "Benekov/Siemens");
    }

    #[test]
    fn test_number_and_select_payloads() {
        let builder = builder();

        let number = builder.payload(&entity("o090", EntityKind::Number));
        assert_eq!(
            number.command_topic.as_deref(),
            Some("benekov/http_192_168_1_50/HMI00001/o090/set")
        );
        assert!(number.unique_id.ends_with("-num"));
        assert!(number.options.is_none());

        let select_entity = entity("o038", EntityKind::Select);
        let select = builder.payload(&select_entity);
        assert!(select.unique_id.ends_with("-sel"));
        assert_eq!(
            select.options,
            Some(vec!["Off".to_string(), "On".to_string()])
        );
        assert!(select.unit_of_measurement.is_none());
        assert_eq!(
            builder.topic(&select_entity),
            "homeassistant/select/climatix_http_192_168_1_50/hmi00001_o038/config"
        );
    }
}
