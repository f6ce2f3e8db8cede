//! Language tables served by the HMI as `HMILang1.js` .. `HMILang4.js`.
//!
//! Each file declares one or more tables of the form
//!
//! ```text
//! var languages1 = {
//! "2. 512": ["Vypnuto", "Off", ...],
//! ...
//! };
//! ```
//!
//! where each array holds the text of one key in every configured language.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Names of the language files, fetched in order.
pub const LANGUAGE_FILES: [&str; 4] = ["HMILang1.js", "HMILang2.js", "HMILang3.js", "HMILang4.js"];

// var languagesN = { ... };
static TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)var\s+languages(\d)\s*=\s*\{(.*?)\};").unwrap());

// "key": ["a", "b"],   (one entry per line)
static ENTRY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)"([^"]+)"\s*:\s*\[(.*?)\]\s*,?\s*$"#).unwrap());

/// Key to per-language text lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageTable {
    entries: HashMap<String, Vec<String>>,
}

impl LanguageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every table found in a script. Later keys replace earlier ones.
    pub fn parse(script: &str) -> Self {
        let mut table = Self::new();
        table.extend_from_script(script);
        table
    }

    /// Add the entries of another script to this table.
    pub fn extend_from_script(&mut self, script: &str) {
        for table in TABLE_REGEX.captures_iter(script) {
            for entry in ENTRY_REGEX.captures_iter(&table[2]) {
                self.entries
                    .insert(entry[1].to_string(), parse_string_array(&entry[2]));
            }
        }
    }

    /// All translations of a key.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Translation of `key` in language `index`, trimmed. Blank texts are `None`.
    pub fn resolve(&self, key: &str, index: usize) -> Option<&str> {
        self.get(key)?
            .get(index)
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the double-quoted strings of a JS array body, honouring backslash escapes.
fn parse_string_array(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current: Option<String> = None;
    let mut escaped = false;

    for ch in raw.chars() {
        match current.as_mut() {
            None => {
                if ch == '"' {
                    current = Some(String::new());
                }
            }
            Some(text) => {
                if escaped {
                    text.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    items.extend(current.take());
                } else {
                    text.push(ch);
                }
            }
        }
    }

    items
}
