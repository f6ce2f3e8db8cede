//! Inbound command handling for writable entities.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use climatix_bridge_framework::IncomingMessage;
use climatix_common::TopicBuilder;

use crate::classifier::EntityKind;
use crate::hmi::{HmiError, PageSource};
use crate::model::Item;
use crate::registry::CommandTargets;

/// Delay between an accepted write and the refresh of its page.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Reasons a command is not carried out.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No writable item for topic {0}")]
    UnknownTopic(String),

    #[error("'{payload}' is not a finite number")]
    InvalidNumber { payload: String },

    #[error("'{payload}' is neither an option nor an index below {count}")]
    InvalidOption { payload: String, count: usize },

    #[error("Item {0} does not accept commands")]
    ReadOnly(String),

    #[error(transparent)]
    Write(#[from] HmiError),
}

/// Translate a command payload into the value written to the HMI.
///
/// Numbers must parse as finite values. Selects accept a plain decimal option
/// index in range or the exact option label and always write the index.
///
/// # Example
/// ```
/// use mqtt_bridge_climatix::classifier::EntityKind;
/// use mqtt_bridge_climatix::commands::resolve_command;
/// use mqtt_bridge_climatix::model::{Item, ItemKey};
///
/// let mut item = Item::generic(ItemKey::parse("o038").unwrap(), None);
/// item.options = Some(vec!["Off".into(), "On".into()]);
///
/// assert_eq!(resolve_command(&item, EntityKind::Select, "On").unwrap(), "1");
/// assert_eq!(resolve_command(&item, EntityKind::Select, "0").unwrap(), "0");
/// assert!(resolve_command(&item, EntityKind::Select, "on").is_err());
/// ```
pub fn resolve_command(item: &Item, kind: EntityKind, payload: &str) -> Result<String, CommandError> {
    let payload = payload.trim();

    match kind {
        EntityKind::Sensor => Err(CommandError::ReadOnly(item.key.to_string())),
        EntityKind::Number => match payload.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(payload.to_string()),
            _ => Err(CommandError::InvalidNumber {
                payload: payload.to_string(),
            }),
        },
        EntityKind::Select => {
            let options = item.option_labels().unwrap_or_default();

            let digits = !payload.is_empty() && payload.bytes().all(|b| b.is_ascii_digit());
            let index = digits
                .then(|| payload.parse::<usize>().ok())
                .flatten()
                .filter(|index| *index < options.len())
                .or_else(|| options.iter().position(|label| label == payload));

            index
                .map(|index| index.to_string())
                .ok_or_else(|| CommandError::InvalidOption {
                    payload: payload.to_string(),
                    count: options.len(),
                })
        }
    }
}

/// Forwards commands to the HMI and requests page refreshes after writes.
pub struct CommandHandler<P: PageSource> {
    source: Arc<P>,
    topics: TopicBuilder,
    targets: CommandTargets,
    refresh: mpsc::Sender<String>,
    settle_delay: Duration,
}

impl<P: PageSource> CommandHandler<P> {
    pub fn new(
        source: Arc<P>,
        topics: TopicBuilder,
        targets: CommandTargets,
        refresh: mpsc::Sender<String>,
    ) -> Self {
        Self {
            source,
            topics,
            targets,
            refresh,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override the delay before a refresh is requested.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Handle one command message. Returns the written value.
    pub async fn handle(&self, topic: &str, payload: &str) -> Result<String, CommandError> {
        let target = self
            .targets
            .get(topic)
            .await
            .ok_or_else(|| CommandError::UnknownTopic(topic.to_string()))?;

        let value = resolve_command(&target.item, target.kind, payload)?;

        self.source
            .write_item(&target.page, &target.item, &value)
            .await?;

        tracing::info!(
            page = %target.page,
            item = %target.item.key,
            payload = %payload.trim(),
            value = %value,
            "Write accepted"
        );

        tokio::time::sleep(self.settle_delay).await;
        if self.refresh.send(target.page.clone()).await.is_err() {
            tracing::debug!(page = %target.page, "Poll loop gone, refresh dropped");
        }

        Ok(value)
    }

    /// Process inbound messages until the channel closes.
    pub async fn run(self, mut incoming: mpsc::Receiver<IncomingMessage>) {
        while let Some(message) = incoming.recv().await {
            if self.topics.parse_command_topic(&message.topic).is_none() {
                tracing::debug!(topic = %message.topic, "Ignoring non-command message");
                continue;
            }

            let payload = message.payload_str();
            match self.handle(&message.topic, &payload).await {
                Ok(_) => {}
                Err(CommandError::Write(e)) => {
                    tracing::error!(topic = %message.topic, error = %e, "Write failed");
                }
                Err(e) => {
                    tracing::warn!(
                        topic = %message.topic,
                        payload = %payload,
                        error = %e,
                        "Command rejected"
                    );
                }
            }
        }

        tracing::debug!("Command channel closed");
    }
}
