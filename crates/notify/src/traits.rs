//! Notifier trait definition and shared error types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint rejected notification with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// One message addressed to a rule owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Opaque owner token the message is addressed to.
    pub owner: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(owner: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            message: message.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "log").
    fn channel_name(&self) -> &str;
}

/// Result of delivering a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
