//! Generic HTTP webhook notifier.
//!
//! Delivers each notification as a JSON `POST` body
//! (`{"owner", "message", "sent_at"}`) with optional custom headers.

use std::collections::HashMap;

use crate::traits::{Notification, Notifier, NotifyError};

/// Delivers notifications as JSON over HTTP to a configured endpoint.
///
/// Environment variable references (`${VAR_NAME}`) in the URL and header
/// values are resolved at construction time.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: reqwest::Url,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Missing env vars or an unparsable URL produce [`NotifyError::Config`].
    pub fn new(url: &str, headers: HashMap<String, String>) -> Result<Self, NotifyError> {
        let resolved = resolve_env_vars(url)?;
        let url = reqwest::Url::parse(&resolved)
            .map_err(|e| NotifyError::Config(format!("invalid webhook url '{resolved}': {e}")))?;

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        Ok(Self {
            url,
            headers: resolved_headers,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(self.url.clone()).json(notification);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, status = %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name)
                .map_err(|_| NotifyError::Config(format!("env var not found: {var_name}")))?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
