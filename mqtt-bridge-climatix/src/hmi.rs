//! HTTP client for the Climatix HMI web interface.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use climatix_bridge_framework::ErrorType;

use crate::language::{LANGUAGE_FILES, LanguageTable};
use crate::model::{Item, Page};
use crate::parser::{assemble_page, parse_layout, parse_read_values};

/// Endpoint accepting writes as `?{mi}={value}`.
pub const WRITE_ENDPOINT: &str = "HMIinput.cgi";

/// Errors talking to the HMI.
#[derive(Debug, Error)]
pub enum HmiError {
    /// Network failure, including timeouts.
    #[error("Request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        timeout: bool,
    },

    /// Credentials rejected (HTTP 401/403).
    #[error("Authentication rejected by {url} (HTTP {status})")]
    Auth { url: String, status: u16 },

    /// Any other non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response did not have the expected structure.
    #[error("Failed to parse {page}: {message}")]
    Parse { page: String, message: String },

    /// Write requested for an item without a write index.
    #[error("Item {key} on {page} is not writable")]
    NotWritable { page: String, key: String },
}

impl HmiError {
    /// Health classification of this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            HmiError::Transport { timeout: true, .. } => ErrorType::Timeout,
            HmiError::Transport { .. } => ErrorType::Connection,
            HmiError::Auth { .. } => ErrorType::AuthFailed,
            HmiError::Status { .. } => ErrorType::ProtocolError,
            HmiError::Parse { .. } => ErrorType::ParseError,
            HmiError::NotWritable { .. } => ErrorType::Other,
        }
    }

    fn transport(url: &str, err: reqwest::Error) -> Self {
        HmiError::Transport {
            url: url.to_string(),
            message: err.to_string(),
            timeout: err.is_timeout(),
        }
    }
}

/// Source of HMI pages and sink for item writes.
///
/// [`HmiClient`] is the HTTP implementation; tests substitute in-memory fakes.
pub trait PageSource: Send + Sync {
    /// Fetch and assemble one page.
    fn fetch_page(&self, page: &str) -> impl Future<Output = Result<Page, HmiError>> + Send;

    /// Write `value` to a writable item of `page`.
    fn write_item(
        &self,
        page: &str,
        item: &Item,
        value: &str,
    ) -> impl Future<Output = Result<(), HmiError>> + Send;
}

/// Connection settings for [`HmiClient`].
#[derive(Debug, Clone)]
pub struct HmiSettings {
    /// Base URL including the scheme, e.g. `http://192.168.1.50`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    /// Index into the language tables.
    pub language: usize,
}

/// HTTP client for one HMI.
pub struct HmiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    language: usize,
    languages: LanguageTable,
}

impl HmiClient {
    /// Create a client. No request is made until the first fetch.
    pub fn new(settings: HmiSettings) -> Result<Self, HmiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| HmiError::transport(&settings.base_url, e))?;

        let mut base_url = settings.base_url;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http,
            base_url,
            username: settings.username,
            password: settings.password,
            language: settings.language,
            languages: LanguageTable::new(),
        })
    }

    /// Use `languages` to resolve labels of fetched pages.
    pub fn with_languages(mut self, languages: LanguageTable) -> Self {
        self.languages = languages;
        self
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch and merge `HMILang1.js` .. `HMILang4.js`. Missing files are skipped.
    pub async fn load_languages(&self) -> LanguageTable {
        let mut table = LanguageTable::new();

        for file in LANGUAGE_FILES {
            match self.get_text(file, &[]).await {
                Ok(script) => table.extend_from_script(&script),
                Err(e) => {
                    tracing::debug!(file = %file, error = %e, "Language file unavailable");
                }
            }
        }

        table
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a path with basic auth and return the body decoded as UTF-8.
    async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<String, HmiError> {
        let url = self.url(path);

        let mut request = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password));
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HmiError::transport(&url, e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(HmiError::Auth {
                    url,
                    status: response.status().as_u16(),
                });
            }
            status => {
                return Err(HmiError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HmiError::transport(&url, e))?;

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl PageSource for HmiClient {
    async fn fetch_page(&self, page: &str) -> Result<Page, HmiError> {
        let html = self.get_text(page, &[]).await?;
        let layout = parse_layout(page, &html, &self.languages, self.language);

        let read = self.get_text(&layout.read_endpoint, &[]).await?;
        let values = parse_read_values(&read);

        if layout.entries.is_empty() && values.is_empty() {
            return Err(HmiError::Parse {
                page: page.to_string(),
                message: format!("no items in layout or {}", layout.read_endpoint),
            });
        }

        tracing::debug!(
            page = %page,
            title = %layout.title,
            read_endpoint = %layout.read_endpoint,
            layout_entries = layout.entries.len(),
            read_values = values.len(),
            "Fetched page"
        );

        Ok(assemble_page(page, layout, &values))
    }

    async fn write_item(&self, page: &str, item: &Item, value: &str) -> Result<(), HmiError> {
        let write_index = item.write_index().ok_or_else(|| HmiError::NotWritable {
            page: page.to_string(),
            key: item.key.to_string(),
        })?;

        self.get_text(WRITE_ENDPOINT, &[(write_index, value)]).await?;

        tracing::debug!(page = %page, item = %item.key, value = %value, "Wrote item");
        Ok(())
    }
}
