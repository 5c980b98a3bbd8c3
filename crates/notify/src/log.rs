//! Channel that records notifications as tracing events.

use crate::traits::{Notification, Notifier, NotifyError};

/// Emits every notification at `info` under the `herald::notification` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            target: "herald::notification",
            owner = %notification.owner,
            sent_at = %notification.sent_at,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
