//! Item selection and entity kinds per profile.

use serde::{Deserialize, Serialize};

use crate::language::LanguageTable;
use crate::model::{Access, Item, ItemKey, Page, ValueKind};

/// Which items are exposed, and how.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// A fixed read-only set of boiler values.
    #[default]
    Monitor,
    /// Every parsed item, writable ones as controls.
    All,
}

impl Profile {
    /// Whether `key` of `page` is exposed under this profile.
    pub fn includes(&self, page: &str, key: &ItemKey) -> bool {
        match self {
            Profile::Monitor => whitelist_entry(page, key.as_str()).is_some(),
            Profile::All => true,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Profile::Monitor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Monitor => "monitor",
            Profile::All => "all",
        }
    }
}

/// Home Assistant component an item is exposed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Sensor,
    Number,
    Select,
}

impl EntityKind {
    /// Discovery component name.
    pub fn component(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "sensor",
            EntityKind::Number => "number",
            EntityKind::Select => "select",
        }
    }

    /// Suffix appended to the unique id.
    pub fn unique_id_suffix(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "",
            EntityKind::Number => "-num",
            EntityKind::Select => "-sel",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "mdi:thermometer",
            EntityKind::Number => "mdi:tune",
            EntityKind::Select => "mdi:menu",
        }
    }

    /// Whether the entity accepts commands.
    pub fn is_writable(&self) -> bool {
        !matches!(self, EntityKind::Sensor)
    }
}

/// A monitored item with its display overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub page: &'static str,
    pub key: &'static str,
    pub label: &'static str,
    pub unit: Option<&'static str>,
    /// Kind used when the entry has to be synthesized.
    pub kind: ValueKind,
    /// Language key holding the option labels of a synthesized entry.
    pub options_key: Option<&'static str>,
}

const fn entry(
    page: &'static str,
    key: &'static str,
    label: &'static str,
    unit: Option<&'static str>,
    kind: ValueKind,
) -> WhitelistEntry {
    WhitelistEntry {
        page,
        key,
        label,
        unit,
        kind,
        options_key: None,
    }
}

/// Items exposed by [`Profile::Monitor`].
pub const MONITOR_WHITELIST: &[WhitelistEntry] = &[
    entry("HMI00001.cgi", "o044", "Current power", Some("%"), ValueKind::Numeric),
    entry("HMI00001.cgi", "o075", "B2 Boiler temperature", Some("°C"), ValueKind::Numeric),
    entry("HMI00001.cgi", "o082", "B7 Return temperature", Some("°C"), ValueKind::Numeric),
    entry("HMI00001.cgi", "o089", "B8 Flue gas temperature", Some("°C"), ValueKind::Numeric),
    WhitelistEntry {
        options_key: Some("2. 512"),
        ..entry("HMI00001.cgi", "o038", "Boiler state", None, ValueKind::Enumerated)
    },
    entry("HMI00001.cgi", "o148", "Fuel", None, ValueKind::Enumerated),
    entry("HMI65000.cgi", "o011", "Active alarms", None, ValueKind::Numeric),
    entry("HMI65000.cgi", "o018", "Alarm history", None, ValueKind::Numeric),
    entry("HMI65000.cgi", "o025", "Alarm ID", None, ValueKind::Numeric),
    entry("HMI00033.cgi", "o010", "Feed time", Some("s"), ValueKind::Numeric),
    entry("HMI00033.cgi", "o020", "Fan power", Some("%"), ValueKind::Numeric),
    entry("HMI00033.cgi", "o030", "Fan coast-down time", Some("s"), ValueKind::Numeric),
];

/// Whitelist entry of `key` on `page`.
pub fn whitelist_entry(page: &str, key: &str) -> Option<&'static WhitelistEntry> {
    MONITOR_WHITELIST
        .iter()
        .find(|entry| entry.page == page && entry.key == key)
}

/// An item as exposed to Home Assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub page: String,
    pub item: Item,
    pub kind: EntityKind,
}

impl Entity {
    pub fn key(&self) -> &ItemKey {
        &self.item.key
    }
}

/// Entity kind of an included item.
///
/// Only enumerated items with labels become selects, so the published state
/// is always one of the announced options.
pub fn entity_kind(item: &Item, profile: Profile) -> EntityKind {
    if profile.is_read_only() {
        return EntityKind::Sensor;
    }

    let enumerated = item.kind == ValueKind::Enumerated && item.option_labels().is_some();
    match (&item.access, enumerated) {
        (Access::ReadOnly, _) => EntityKind::Sensor,
        (Access::Writable { .. }, true) => EntityKind::Select,
        (Access::Writable { .. }, false) => EntityKind::Number,
    }
}

/// Entities of a page under `profile`.
///
/// Pages outside `include_pages` yield nothing. Under [`Profile::Monitor`]
/// whitelisted labels and units replace the parsed ones.
pub fn classify(page: &Page, profile: Profile, include_pages: &[String]) -> Vec<Entity> {
    if !include_pages.iter().any(|p| p == &page.id) {
        return Vec::new();
    }

    page.items
        .iter()
        .filter(|item| profile.includes(&page.id, &item.key))
        .map(|item| {
            let mut item = item.clone();
            if profile == Profile::Monitor {
                if let Some(entry) = whitelist_entry(&page.id, item.key.as_str()) {
                    item.label = entry.label.to_string();
                    if let Some(unit) = entry.unit {
                        item.unit = Some(unit.to_string());
                    }
                }
            }

            Entity {
                page: page.id.clone(),
                kind: entity_kind(&item, profile),
                item,
            }
        })
        .collect()
}

/// Add whitelisted items the layout did not expose.
///
/// Values reported by the read endpoint for those keys are carried over.
/// Option labels come from the language table, where an options key lists
/// one label per state. Returns the number added.
pub fn complete_monitor_page(page: &mut Page, languages: &LanguageTable) -> usize {
    let page_id = page.id.clone();
    let mut added = 0;

    for entry in MONITOR_WHITELIST.iter().filter(|e| e.page == page_id) {
        if page.item(entry.key).is_some() {
            continue;
        }
        let Some(key) = ItemKey::parse(entry.key) else {
            continue;
        };

        let options = entry.options_key.and_then(|lg| {
            languages
                .get(lg)
                .map(|labels| labels.iter().map(|l| l.trim().to_string()).collect())
        });

        page.items.push(Item {
            value: page.unlisted.remove(&key),
            label: entry.label.to_string(),
            unit: entry.unit.map(str::to_string),
            kind: entry.kind,
            options,
            access: Access::ReadOnly,
            ordinal: None,
            key,
        });
        added += 1;
    }

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemValue;
    use std::collections::BTreeMap;

    fn item(key: &str, access: Access, options: Option<Vec<&str>>) -> Item {
        Item {
            key: ItemKey::parse(key).unwrap(),
            ordinal: Some(1),
            label: format!("label {}", key),
            value: Some(ItemValue::Number(1.0)),
            unit: None,
            kind: if options.is_some() {
                ValueKind::Enumerated
            } else {
                ValueKind::Numeric
            },
            options: options.map(|o| o.into_iter().map(str::to_string).collect()),
            access,
        }
    }

    fn writable() -> Access {
        Access::Writable {
            write_index: "val:0x1".to_string(),
        }
    }

    fn page(id: &str, items: Vec<Item>) -> Page {
        Page {
            id: id.to_string(),
            title: String::new(),
            read_endpoint: id.replace(".cgi", "Read.cgi"),
            items,
            unlisted: BTreeMap::new(),
        }
    }

    fn pages() -> Vec<String> {
        vec![
            "HMI00001.cgi".to_string(),
            "HMI00033.cgi".to_string(),
            "HMI65000.cgi".to_string(),
        ]
    }

    #[test]
    fn test_entity_kind_all_profile() {
        assert_eq!(
            entity_kind(&item("o1", Access::ReadOnly, None), Profile::All),
            EntityKind::Sensor
        );
        assert_eq!(
            entity_kind(&item("o1", Access::ReadOnly, Some(vec!["a"])), Profile::All),
            EntityKind::Sensor
        );
        assert_eq!(
            entity_kind(&item("o1", writable(), None), Profile::All),
            EntityKind::Number
        );
        assert_eq!(
            entity_kind(&item("o1", writable(), Some(vec!["a", "b"])), Profile::All),
            EntityKind::Select
        );
        // An empty option list is not a label set
        assert_eq!(
            entity_kind(&item("o1", writable(), Some(vec![])), Profile::All),
            EntityKind::Number
        );
    }

    #[test]
    fn test_labelled_value_item_is_number() {
        let mut labelled = item("o041", writable(), Some(vec!["Off", "On", "Auto"]));
        labelled.kind = ValueKind::Numeric;
        labelled.value = Some(ItemValue::Number(2.0));

        assert_eq!(entity_kind(&labelled, Profile::All), EntityKind::Number);
        assert_eq!(labelled.state_payload().as_deref(), Some("2"));
    }

    #[test]
    fn test_monitor_is_always_sensor() {
        assert_eq!(
            entity_kind(&item("o044", writable(), None), Profile::Monitor),
            EntityKind::Sensor
        );
        assert_eq!(
            entity_kind(&item("o038", writable(), Some(vec!["a"])), Profile::Monitor),
            EntityKind::Sensor
        );
    }

    #[test]
    fn test_monitor_whitelist_filter() {
        let page = page(
            "HMI00001.cgi",
            vec![
                item("o044", writable(), None),
                item("o075", Access::ReadOnly, None),
                item("o999", Access::ReadOnly, None),
            ],
        );

        let entities = classify(&page, Profile::Monitor, &pages());
        let keys: Vec<&str> = entities.iter().map(|e| e.key().as_str()).collect();
        assert_eq!(keys, vec!["o044", "o075"]);
        assert!(entities.iter().all(|e| e.kind == EntityKind::Sensor));

        assert_eq!(entities[0].item.label, "Current power");
        assert_eq!(entities[0].item.unit.as_deref(), Some("%"));
        assert_eq!(entities[1].item.unit.as_deref(), Some("°C"));
    }

    #[test]
    fn test_page_not_included() {
        let page = page("HMI00002.cgi", vec![item("o044", Access::ReadOnly, None)]);
        assert!(classify(&page, Profile::All, &pages()).is_empty());
    }

    #[test]
    fn test_all_profile_keeps_everything() {
        let page = page(
            "HMI00033.cgi",
            vec![
                item("o010", Access::ReadOnly, None),
                item("o500", writable(), None),
                item("o501", writable(), Some(vec!["Off", "On"])),
            ],
        );

        let entities = classify(&page, Profile::All, &pages());
        let kinds: Vec<EntityKind> = entities.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EntityKind::Sensor, EntityKind::Number, EntityKind::Select]
        );
        // Parsed labels are kept outside the monitor profile
        assert_eq!(entities[0].item.label, "label o010");
    }

    #[test]
    fn test_complete_monitor_page() {
        let languages = LanguageTable::parse(
            "var languages1 = {\n\"2. 512\": [\"Off\", \"Ignition\", \"Heating\"]\n};",
        );
        let mut page = page("HMI00001.cgi", vec![item("o044", Access::ReadOnly, None)]);
        page.unlisted
            .insert(ItemKey::parse("o038").unwrap(), ItemValue::Number(2.0));

        let added = complete_monitor_page(&mut page, &languages);
        assert_eq!(added, 5);
        assert!(page.unlisted.is_empty());

        let state = page.item("o038").unwrap();
        assert_eq!(state.label, "Boiler state");
        assert_eq!(state.kind, ValueKind::Enumerated);
        assert_eq!(state.state_payload().as_deref(), Some("Heating"));
        assert!(!state.is_writable());

        let flue = page.item("o089").unwrap();
        assert_eq!(flue.unit.as_deref(), Some("°C"));
        assert!(flue.value.is_none());

        // Idempotent
        assert_eq!(complete_monitor_page(&mut page, &languages), 0);
    }

    #[test]
    fn test_whitelist_keys_are_valid() {
        for entry in MONITOR_WHITELIST {
            assert!(ItemKey::parse(entry.key).is_some(), "{}", entry.key);
            assert!(climatix_common::is_valid_page_id(entry.page));
        }
        assert_eq!(MONITOR_WHITELIST.len(), 12);
    }
}
