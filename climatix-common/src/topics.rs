//! MQTT topic builders.
//!
//! Item topics follow the pattern:
//! `<base_topic>/<host>/<page>/<item>/{state,set,attributes}`
//!
//! where `<host>` is the slugified device host and `<page>` is the page id
//! without its `.cgi` suffix.

/// Default topic root for bridge state.
pub const DEFAULT_BASE_TOPIC: &str = "benekov";

/// Default Home Assistant discovery prefix.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Suffix of the inbound command topic.
pub const COMMAND_SUFFIX: &str = "set";

/// Lowercase `text` and collapse everything outside `[a-z0-9_]` into single
/// underscores.
///
/// # Example
/// ```
/// use climatix_common::topics::slugify;
///
/// assert_eq!(slugify("http://192.168.1.50/"), "http_192_168_1_50");
/// assert_eq!(slugify("***"), "item");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch);
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

/// Strip the `.cgi` suffix from a page id.
///
/// # Example
/// ```
/// use climatix_common::topics::page_stem;
///
/// assert_eq!(page_stem("HMI00001.cgi"), "HMI00001");
/// assert_eq!(page_stem("HMI00001"), "HMI00001");
/// ```
pub fn page_stem(page: &str) -> &str {
    page.strip_suffix(".cgi").unwrap_or(page)
}

/// Check that a page id is a plain CGI file name (`[A-Za-z0-9_]+.cgi`).
///
/// Restricting page ids this way keeps page stems distinct and free of
/// MQTT wildcard or separator characters.
pub fn is_valid_page_id(page: &str) -> bool {
    match page.strip_suffix(".cgi") {
        Some(stem) => {
            !stem.is_empty() && stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// The three topics owned by a single item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemTopics {
    /// Current value.
    pub state: String,
    /// Inbound command topic (only subscribed for writable items).
    pub command: String,
    /// JSON metadata.
    pub attributes: String,
}

/// Builder for topics of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    base_topic: String,
    host_slug: String,
}

impl TopicBuilder {
    /// Create a builder for the given base topic and device host.
    pub fn new(base_topic: impl Into<String>, host: &str) -> Self {
        let base_topic: String = base_topic.into();
        Self {
            base_topic: base_topic.trim_end_matches('/').to_string(),
            host_slug: slugify(host),
        }
    }

    /// Configured base topic.
    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Slugified device host used as the second topic level.
    pub fn host_slug(&self) -> &str {
        &self.host_slug
    }

    /// Topic root for one item.
    ///
    /// # Example
    /// ```
    /// use climatix_common::topics::TopicBuilder;
    ///
    /// let builder = TopicBuilder::new("benekov", "http://10.0.0.5");
    /// assert_eq!(
    ///     builder.item_root("HMI00001.cgi", "o044"),
    ///     "benekov/http_10_0_0_5/HMI00001/o044"
    /// );
    /// ```
    pub fn item_root(&self, page: &str, key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_topic,
            self.host_slug,
            page_stem(page),
            key
        )
    }

    /// State, command and attribute topics for one item.
    pub fn item_topics(&self, page: &str, key: &str) -> ItemTopics {
        let root = self.item_root(page, key);
        ItemTopics {
            state: format!("{}/state", root),
            command: format!("{}/{}", root, COMMAND_SUFFIX),
            attributes: format!("{}/attributes", root),
        }
    }

    /// Retained `online`/`offline` availability topic (also the last will).
    pub fn availability_topic(&self) -> String {
        format!("{}/{}/status", self.base_topic, self.host_slug)
    }

    /// Retained bridge status JSON.
    pub fn bridge_status_topic(&self) -> String {
        format!("{}/{}/bridge", self.base_topic, self.host_slug)
    }

    /// Bridge health snapshot JSON.
    pub fn health_topic(&self) -> String {
        format!("{}/{}/bridge/health", self.base_topic, self.host_slug)
    }

    /// Parse a command topic of this device back into page stem and item key.
    ///
    /// Returns `None` for topics of other devices or other suffixes.
    pub fn parse_command_topic<'a>(&self, topic: &'a str) -> Option<ParsedItemTopic<'a>> {
        let rest = topic
            .strip_prefix(self.base_topic.as_str())?
            .strip_prefix('/')?
            .strip_prefix(self.host_slug.as_str())?
            .strip_prefix('/')?;

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 3 || parts[2] != COMMAND_SUFFIX {
            return None;
        }
        if parts[0].is_empty() || parts[1].is_empty() {
            return None;
        }

        Some(ParsedItemTopic {
            page_stem: parts[0],
            key: parts[1],
        })
    }
}

/// Parsed components of an item command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItemTopic<'a> {
    pub page_stem: &'a str,
    pub key: &'a str,
}

/// Build a Home Assistant discovery config topic.
///
/// # Example
/// ```
/// use climatix_common::topics::discovery_topic;
///
/// assert_eq!(
///     discovery_topic("homeassistant", "sensor", "climatix_boiler", "hmi00001_o044"),
///     "homeassistant/sensor/climatix_boiler/hmi00001_o044/config"
/// );
/// ```
pub fn discovery_topic(prefix: &str, component: &str, node_id: &str, object_id: &str) -> String {
    format!(
        "{}/{}/{}/{}/config",
        prefix.trim_end_matches('/'),
        component,
        node_id,
        object_id
    )
}
