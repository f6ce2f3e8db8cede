//! Item and page model for Climatix HMI pages.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use climatix_common::page_stem;

/// Item identifier as used by the HMI (`oNNN`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Parse an `o` followed by one or more digits.
    ///
    /// # Example
    /// ```
    /// use mqtt_bridge_climatix::model::ItemKey;
    ///
    /// assert!(ItemKey::parse("o044").is_some());
    /// assert!(ItemKey::parse("l044").is_none());
    /// assert!(ItemKey::parse("o").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.strip_prefix('o')?;
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ItemKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Value reported by the read endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemValue {
    /// Finite numeric value.
    Number(f64),
    /// Anything else, trimmed.
    Text(String),
}

impl ItemValue {
    /// Interpret a raw value from the read endpoint.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => ItemValue::Number(n),
            _ => ItemValue::Text(raw.to_string()),
        }
    }

    /// The value as an option index, if it is a non-negative integer.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            ItemValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemValue::Number(n) => write!(f, "{}", n),
            ItemValue::Text(s) => f.write_str(s),
        }
    }
}

/// Value kind declared by the layout (`it` attribute).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueKind {
    /// `it="v"`.
    Numeric,
    /// `it="e"`.
    Enumerated,
    /// Missing or unknown.
    #[default]
    Other,
}

impl ValueKind {
    /// Map the `it` attribute.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("v") => ValueKind::Numeric,
            Some("e") => ValueKind::Enumerated,
            _ => ValueKind::Other,
        }
    }

    /// The `it` attribute value, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ValueKind::Numeric => Some("v"),
            ValueKind::Enumerated => Some("e"),
            ValueKind::Other => None,
        }
    }

    /// Whether the layout declares the item as a value display.
    pub fn is_declared(&self) -> bool {
        !matches!(self, ValueKind::Other)
    }
}

/// Whether an item can be written, and how.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    ReadOnly,
    /// Writable through `HMIinput.cgi` with the given `mi` identifier.
    Writable { write_index: String },
}

impl Access {
    /// Build from the optional `mi` attribute; blank identifiers are read-only.
    pub fn from_write_index(write_index: Option<&str>) -> Self {
        match write_index.map(str::trim) {
            Some(index) if !index.is_empty() => Access::Writable {
                write_index: index.to_string(),
            },
            _ => Access::ReadOnly,
        }
    }
}

/// A single displayed item of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    /// Position in the layout (`dNNN`), `None` for synthesized items.
    pub ordinal: Option<u32>,
    pub label: String,
    pub value: Option<ItemValue>,
    pub unit: Option<String>,
    pub kind: ValueKind,
    /// Labels of an enumerated value, in index order.
    pub options: Option<Vec<String>>,
    pub access: Access,
}

impl Item {
    /// A bare read-only item labelled by its key.
    pub fn generic(key: ItemKey, value: Option<ItemValue>) -> Self {
        Self {
            label: key.to_string(),
            key,
            ordinal: None,
            value,
            unit: None,
            kind: ValueKind::Numeric,
            options: None,
            access: Access::ReadOnly,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.access, Access::Writable { .. })
    }

    pub fn write_index(&self) -> Option<&str> {
        match &self.access {
            Access::Writable { write_index } => Some(write_index),
            Access::ReadOnly => None,
        }
    }

    /// Non-empty option labels.
    pub fn option_labels(&self) -> Option<&[String]> {
        self.options.as_deref().filter(|o| !o.is_empty())
    }

    /// State payload: enumerated values map to their label when one exists.
    pub fn state_payload(&self) -> Option<String> {
        let value = self.value.as_ref()?;

        if self.kind == ValueKind::Enumerated {
            let label = value
                .as_index()
                .zip(self.option_labels())
                .and_then(|(index, options)| options.get(index));
            if let Some(label) = label {
                return Some(label.clone());
            }
        }

        Some(value.to_string())
    }
}

/// One polled HMI page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Page id, e.g. `HMI00001.cgi`.
    pub id: String,
    pub title: String,
    pub read_endpoint: String,
    /// Items in layout order.
    pub items: Vec<Item>,
    /// Values from the read endpoint with no layout entry.
    pub unlisted: BTreeMap<ItemKey, ItemValue>,
}

impl Page {
    /// Page id without `.cgi`.
    pub fn stem(&self) -> &str {
        page_stem(&self.id)
    }

    pub fn item(&self, key: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.key.as_str() == key)
    }
}
