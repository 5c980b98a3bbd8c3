//! Delivers notifications to every configured channel.
//!
//! Individual channel failures don't block other channels.

use herald_core::config::NotifyConfig;

use crate::log::LogNotifier;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// Fans one notification out to a fixed set of channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Channels enabled by config: the webhook when a URL is set, plus the
    /// log channel when switched on.
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(url) = &config.webhook_url {
            channels.push(Box::new(WebhookNotifier::new(url, Default::default())?));
        }
        if config.log_channel {
            channels.push(Box::new(LogNotifier));
        }
        if channels.is_empty() {
            tracing::warn!("no notification channels configured; notifications will be dropped");
        }
        Ok(Self::new(channels))
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver to every channel in order and report each outcome.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!(owner = %notification.owner, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(
                        owner = %notification.owner,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        owner = %notification.owner,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}
