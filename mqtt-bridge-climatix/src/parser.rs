//! Parsers for HMI page layouts and read endpoint responses.
//!
//! A page is described by two documents:
//!
//! - the layout HTML (`HMI00001.cgi`), where every item sits in a
//!   `<div id="dNNN">` block with a label cell `<td id="lNNN">`, a value span
//!   `<span id="oNNN" it="v|e" mi="..." e="a*b*c">` and an optional unit span
//!   `<span class="u">`;
//! - the read endpoint (`HMI00001Read.cgi`), a flat list of
//!   `oNNN,T,value|` records.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use climatix_common::page_stem;

use crate::language::LanguageTable;
use crate::model::{Access, Item, ItemKey, ItemValue, Page, ValueKind};

/// Span holding the page title.
static TITLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<span([^>]*\bid="o002"[^>]*)>(.*?)</span>"#).unwrap());

// function GFR() { ...("HMI00001Read.cgi"); }
static READ_ENDPOINT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"function\s+GFR\(\)[^\{]*\{[^"]*\("(HMI\d+Read\.cgi)"\)\s*;\s*\}"#).unwrap()
});

static DIV_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<div\s+id=['"]d(\d+)['"]>(.*?)</div>"#).unwrap());

static LABEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<td[^>]*id=['"]l(\d+)['"][^>]*>(.*?)</td>"#).unwrap());

static LABEL_LG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<span[^>]*\blg="([^"]+)"[^>]*>.*?</span>"#).unwrap());

static VALUE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<span([^>]*)\bid="(o\d+)"([^>]*)>(.*?)</span>"#).unwrap());

static UNIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<span[^>]*\bclass="u"[^>]*>(.*?)</span>"#).unwrap());

static ATTR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b([A-Za-z]+)="([^"]*)""#).unwrap());

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// oNNN,T,<optional newline>value|
static READ_RECORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(o\d+),(\w),\s*(.*?)\|").unwrap());

/// One item declared by the layout HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    /// `NNN` of the enclosing `dNNN` block.
    pub ordinal: u32,
    pub key: ItemKey,
    pub label: String,
    pub kind: ValueKind,
    /// `mi` attribute.
    pub write_index: Option<String>,
    pub unit: Option<String>,
    /// `*`-separated `e` attribute.
    pub options: Option<Vec<String>>,
}

/// Parsed layout HTML of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub title: String,
    pub read_endpoint: String,
    pub entries: Vec<LayoutEntry>,
}

/// One record of the read endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadValue {
    /// Single-character type tag.
    pub type_code: String,
    /// Trimmed value text.
    pub raw: String,
}

/// Values of a read endpoint keyed by item.
pub type ReadValues = BTreeMap<ItemKey, ReadValue>;

/// Parse a page layout.
///
/// Labels referenced through `lg` attributes are resolved with `languages`
/// in language `language`; other labels are the tag-stripped cell text.
pub fn parse_layout(
    page: &str,
    html: &str,
    languages: &LanguageTable,
    language: usize,
) -> PageLayout {
    let title = TITLE_REGEX
        .captures(html)
        .and_then(|caps| {
            attribute(&caps[1], "lg")
                .and_then(|key| languages.resolve(key, language))
                .map(str::to_string)
                .or_else(|| non_empty(strip_tags(&caps[2])))
        })
        .unwrap_or_else(|| page_stem(page).to_string());

    let read_endpoint = READ_ENDPOINT_REGEX
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| format!("{}Read.cgi", page_stem(page)));

    let entries = DIV_REGEX
        .captures_iter(html)
        .filter_map(|caps| parse_entry(&caps[1], &caps[2], languages, language))
        .collect();

    PageLayout {
        title,
        read_endpoint,
        entries,
    }
}

fn parse_entry(
    ordinal: &str,
    block: &str,
    languages: &LanguageTable,
    language: usize,
) -> Option<LayoutEntry> {
    let value = VALUE_REGEX.captures(block)?;
    let key = ItemKey::parse(&value[2])?;
    let ordinal = ordinal.parse::<u32>().ok()?;
    let attrs = format!("{} {}", &value[1], &value[3]);

    let label = LABEL_REGEX
        .captures(block)
        .and_then(|caps| {
            let cell = caps.get(2)?.as_str();
            LABEL_LG_REGEX
                .captures(cell)
                .and_then(|lg| languages.resolve(&lg[1], language))
                .map(str::to_string)
                .or_else(|| non_empty(strip_tags(cell)))
        })
        .unwrap_or_default();

    let unit = UNIT_REGEX
        .captures(block)
        .and_then(|caps| non_empty(strip_tags(&caps[1])));

    let options = attribute(&attrs, "e").map(parse_options);

    Some(LayoutEntry {
        ordinal,
        key,
        label,
        kind: ValueKind::from_code(attribute(&attrs, "it")),
        write_index: attribute(&attrs, "mi").map(str::to_string),
        unit,
        options,
    })
}

/// Parse the read endpoint response.
///
/// # Example
/// ```
/// use mqtt_bridge_climatix::parser::parse_read_values;
///
/// let values = parse_read_values("o044,v,\n 45 |o038,e,1|");
/// assert_eq!(values["o044"].raw, "45");
/// assert_eq!(values["o038"].type_code, "e");
/// ```
pub fn parse_read_values(text: &str) -> ReadValues {
    READ_RECORD_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let key = ItemKey::parse(&caps[1])?;
            Some((
                key,
                ReadValue {
                    type_code: caps[2].to_string(),
                    raw: caps[3].trim().to_string(),
                },
            ))
        })
        .collect()
}

/// Combine a layout with its read values into a [`Page`].
///
/// Layout entries are kept when the read endpoint reports them or the layout
/// declares them as value displays. A page whose layout yields nothing falls
/// back to one generic item per read value.
pub fn assemble_page(page: &str, layout: PageLayout, values: &ReadValues) -> Page {
    let mut items: Vec<Item> = layout
        .entries
        .into_iter()
        .filter(|entry| values.contains_key(&entry.key) || entry.kind.is_declared())
        .map(|entry| Item {
            value: values.get(&entry.key).map(|v| ItemValue::parse(&v.raw)),
            access: Access::from_write_index(entry.write_index.as_deref()),
            key: entry.key,
            ordinal: Some(entry.ordinal),
            label: entry.label,
            unit: entry.unit,
            kind: entry.kind,
            options: entry.options,
        })
        .collect();

    if items.is_empty() {
        items = values
            .iter()
            .map(|(key, value)| Item::generic(key.clone(), Some(ItemValue::parse(&value.raw))))
            .collect();
    }

    let unlisted = values
        .iter()
        .filter(|(key, _)| !items.iter().any(|item| &item.key == *key))
        .map(|(key, value)| (key.clone(), ItemValue::parse(&value.raw)))
        .collect();

    Page {
        id: page.to_string(),
        title: layout.title,
        read_endpoint: layout.read_endpoint,
        items,
        unlisted,
    }
}

/// Split an enum definition on `*`, dropping blank parts.
pub fn parse_options(definition: &str) -> Vec<String> {
    definition
        .replace(['\r', '\n'], " ")
        .split('*')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Value of a double-quoted attribute, if present and non-empty.
fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    ATTR_REGEX
        .captures_iter(attrs)
        .find(|caps| &caps[1] == name)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
        .filter(|value| !value.is_empty())
}

/// Replace tags with spaces and collapse whitespace.
fn strip_tags(html: &str) -> String {
    let text = TAG_REGEX.replace_all(html, " ");
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}
