//! HMI polling and entity publishing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use climatix_bridge_framework::{BridgeHealth, MessageSink, PublishStats};

use crate::classifier::{Profile, classify, complete_monitor_page};
use crate::hmi::{HmiError, PageSource};
use crate::language::LanguageTable;
use crate::publisher::EntityPublisher;
use crate::registry::{CommandTarget, CommandTargets, EntityRegistry};

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Pages polled each cycle, in order.
    pub pages: Vec<String>,
    pub profile: Profile,
    pub interval: Duration,
    /// Topic for the health snapshot published after each cycle.
    pub health_topic: String,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub entities: usize,
    pub publish: PublishStats,
}

/// Polls the configured pages and publishes their entities.
pub struct HmiPoller<P: PageSource, S: MessageSink> {
    source: Arc<P>,
    publisher: EntityPublisher<S>,
    registry: EntityRegistry,
    targets: CommandTargets,
    languages: LanguageTable,
    health: BridgeHealth,
    settings: PollerSettings,
    refresh: Option<mpsc::Receiver<String>>,
}

impl<P: PageSource, S: MessageSink> HmiPoller<P, S> {
    pub fn new(
        source: Arc<P>,
        publisher: EntityPublisher<S>,
        targets: CommandTargets,
        languages: LanguageTable,
        settings: PollerSettings,
    ) -> Self {
        Self {
            source,
            publisher,
            registry: EntityRegistry::new(),
            targets,
            languages,
            health: BridgeHealth::new("climatix", settings.pages.iter().cloned()),
            settings,
            refresh: None,
        }
    }

    /// Poll single pages on request, e.g. right after a write.
    pub fn with_refresh_requests(mut self, refresh: mpsc::Receiver<String>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn health(&self) -> &BridgeHealth {
        &self.health
    }

    /// Run the polling loop forever.
    pub async fn run(mut self) {
        tracing::info!(
            pages = ?self.settings.pages,
            profile = self.settings.profile.as_str(),
            interval_secs = self.settings.interval.as_secs(),
            "Starting HMI poller"
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = self.refresh.take();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                Some(page) = recv_refresh(&mut refresh) => {
                    self.refresh_page(&page).await;
                }
            }
        }
    }

    /// Poll every configured page once. A failing page does not stop the others.
    pub async fn poll_once(&mut self) -> CycleSummary {
        let start = Instant::now();
        let mut summary = CycleSummary::default();

        for page in self.settings.pages.clone() {
            match self.poll_page(&page).await {
                Ok((entities, stats)) => {
                    self.health.record_page_success(&page);
                    summary.pages_ok += 1;
                    summary.entities += entities;
                    summary.publish.merge(stats);
                }
                Err(e) => {
                    self.record_failure(&page, &e);
                    summary.pages_failed += 1;
                }
            }
        }

        self.health
            .record_cycle(start.elapsed(), summary.publish.success);

        if let Err(e) = self
            .health
            .publish(self.publisher.sink(), &self.settings.health_topic)
            .await
        {
            tracing::warn!(error = %e, "Failed to publish health");
        }

        tracing::debug!(
            pages_ok = summary.pages_ok,
            pages_failed = summary.pages_failed,
            entities = summary.entities,
            published = summary.publish.success,
            publish_failed = summary.publish.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );

        summary
    }

    /// Poll one page out of cycle.
    pub async fn refresh_page(&mut self, page: &str) {
        if !self.settings.pages.iter().any(|p| p == page) {
            tracing::debug!(page = %page, "Refresh requested for unpolled page");
            return;
        }

        match self.poll_page(page).await {
            Ok((entities, _)) => {
                self.health.record_page_success(page);
                tracing::debug!(page = %page, entities, "Page refreshed");
            }
            Err(e) => self.record_failure(page, &e),
        }
    }

    /// Fetch, classify and publish one page. Returns the entity count.
    async fn poll_page(&mut self, page: &str) -> Result<(usize, PublishStats), HmiError> {
        let mut data = self.source.fetch_page(page).await?;

        if self.settings.profile == Profile::Monitor {
            let added = complete_monitor_page(&mut data, &self.languages);
            if added > 0 {
                tracing::debug!(page = %page, added, "Added monitored items missing from layout");
            }
        }

        let entities = classify(&data, self.settings.profile, &self.settings.pages);
        let mut stats = PublishStats::default();

        for entity in &entities {
            let discovery = self
                .publisher
                .publish_discovery(&mut self.registry, entity)
                .await;
            log_publish_error(page, entity.key().as_str(), &discovery);
            stats.record(&discovery);

            if entity.kind.is_writable() {
                let topic = self
                    .publisher
                    .discovery()
                    .topics()
                    .item_topics(page, entity.key().as_str())
                    .command;
                if self.targets.upsert(topic, CommandTarget::from(entity)).await {
                    let subscribed = self.publisher.subscribe_commands(entity).await;
                    log_publish_error(page, entity.key().as_str(), &subscribed);
                }
            }

            let state = self.publisher.publish_state(entity).await;
            log_publish_error(page, entity.key().as_str(), &state);
            stats.record(&state);

            let attributes = self.publisher.publish_attributes(entity).await;
            log_publish_error(page, entity.key().as_str(), &attributes);
            stats.record(&attributes);
        }

        Ok((entities.len(), stats))
    }

    fn record_failure(&mut self, page: &str, error: &HmiError) {
        let error_type = error.error_type();
        if error_type.is_retryable() {
            tracing::warn!(page = %page, error = %error, "Page poll failed");
        } else {
            tracing::error!(page = %page, error = %error, "Page poll failed");
        }
        self.health
            .record_page_failure(page, error_type, &error.to_string());
    }
}

async fn recv_refresh(refresh: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match refresh {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_publish_error<T>(page: &str, item: &str, result: &climatix_bridge_framework::Result<T>) {
    if let Err(e) = result {
        tracing::warn!(page = %page, item = %item, error = %e, "Publish failed");
    }
}
