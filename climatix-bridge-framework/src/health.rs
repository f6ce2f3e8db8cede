//! Bridge health monitoring.
//!
//! This module provides:
//! - [`BridgeHealth`] for tracking poll cycles and per-page availability
//! - [`ErrorType`] for classifying failures
//! - [`HealthSnapshot`] for publishing the current state

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::MessageSink;

/// Consecutive failures after which a page is reported offline.
pub const OFFLINE_AFTER_FAILURES: u32 = 3;

/// Page availability status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Page is responding normally.
    Online,
    /// Page is not responding.
    Offline,
    /// Page failed recently but not often enough to be offline.
    Degraded,
    /// Page has not been polled yet.
    #[default]
    Unknown,
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageStatus::Online => write!(f, "online"),
            PageStatus::Offline => write!(f, "offline"),
            PageStatus::Degraded => write!(f, "degraded"),
            PageStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error type classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Request timed out.
    Timeout,
    /// Authentication failed. Retrying without a configuration change will not help.
    AuthFailed,
    /// Connection refused or reset.
    Connection,
    /// Unexpected response structure.
    ParseError,
    /// Non-success protocol response.
    ProtocolError,
    /// Other/unknown error.
    #[default]
    Other,
}

impl ErrorType {
    /// Whether the next poll cycle may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorType::AuthFailed)
    }
}

/// Per-page liveness information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLiveness {
    /// Current status.
    pub status: PageStatus,
    /// Last successful poll (millis since epoch), 0 if never.
    pub last_seen: i64,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// Classification of the last error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_type: Option<ErrorType>,
    /// Last error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Health snapshot for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Bridge name.
    pub bridge: String,
    /// Overall health status ("healthy", "degraded", "unhealthy").
    pub status: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Completed poll cycles.
    pub cycles: u64,
    /// Pages currently responding.
    pub pages_responding: usize,
    /// Pages currently failing.
    pub pages_failed: usize,
    /// Last cycle duration in milliseconds.
    pub last_poll_duration_ms: u64,
    /// Total failed page polls since start.
    pub errors_total: u64,
    /// Total messages published since start.
    pub messages_published: u64,
    /// Per-page details.
    pub pages: BTreeMap<String, PageLiveness>,
}

/// Health tracker owned by the poll loop.
#[derive(Debug)]
pub struct BridgeHealth {
    bridge_name: String,
    start_time: Instant,
    cycles: u64,
    errors_total: u64,
    messages_published: u64,
    last_poll_duration: Duration,
    pages: BTreeMap<String, PageLiveness>,
}

impl BridgeHealth {
    /// Create a new health tracker for the given pages.
    pub fn new<I, P>(bridge_name: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            bridge_name: bridge_name.into(),
            start_time: Instant::now(),
            cycles: 0,
            errors_total: 0,
            messages_published: 0,
            last_poll_duration: Duration::ZERO,
            pages: pages
                .into_iter()
                .map(|p| (p.into(), PageLiveness::default()))
                .collect(),
        }
    }

    /// Record that a page poll succeeded.
    pub fn record_page_success(&mut self, page: &str) {
        let state = self.pages.entry(page.to_string()).or_default();
        state.status = PageStatus::Online;
        state.last_seen = chrono::Utc::now().timestamp_millis();
        state.consecutive_failures = 0;
        state.last_error_type = None;
        state.last_error = None;
    }

    /// Record that a page poll failed.
    pub fn record_page_failure(&mut self, page: &str, error_type: ErrorType, error: &str) {
        let state = self.pages.entry(page.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_error_type = Some(error_type);
        state.last_error = Some(error.to_string());

        state.status = if state.consecutive_failures >= OFFLINE_AFTER_FAILURES {
            PageStatus::Offline
        } else {
            PageStatus::Degraded
        };

        self.errors_total += 1;
    }

    /// Record a completed cycle.
    pub fn record_cycle(&mut self, duration: Duration, messages_published: usize) {
        self.cycles += 1;
        self.last_poll_duration = duration;
        self.messages_published += messages_published as u64;
    }

    /// Liveness of one page.
    pub fn page(&self, page: &str) -> Option<&PageLiveness> {
        self.pages.get(page)
    }

    /// Current health snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        let responding = self
            .pages
            .values()
            .filter(|p| p.status == PageStatus::Online)
            .count();
        let failed = self
            .pages
            .values()
            .filter(|p| matches!(p.status, PageStatus::Offline | PageStatus::Degraded))
            .count();

        let status = if failed == 0 {
            "healthy"
        } else if responding > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        HealthSnapshot {
            bridge: self.bridge_name.clone(),
            status: status.to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            cycles: self.cycles,
            pages_responding: responding,
            pages_failed: failed,
            last_poll_duration_ms: self.last_poll_duration.as_millis() as u64,
            errors_total: self.errors_total,
            messages_published: self.messages_published,
            pages: self.pages.clone(),
        }
    }

    /// Publish the current snapshot (not retained).
    pub async fn publish<S: MessageSink>(&self, sink: &S, topic: &str) -> Result<()> {
        sink.publish_json(topic, &self.snapshot(), false).await
    }
}
