//! Adapters from the llm and notify crates onto the engine's ports.

use async_trait::async_trait;
use tracing::warn;

use herald_llm::{LlmError, RuleCodeGenerator};
use herald_notify::{Dispatcher, Notification};
use herald_rules::error::{Result, RuleError};
use herald_rules::ports::{NotificationSink, SourceGenerator};

/// [`SourceGenerator`] backed by the configured LLM provider.
///
/// When no provider could be configured, every request fails with
/// [`RuleError::Generation`] carrying the configuration problem.
pub struct LlmSourceGenerator {
    inner: std::result::Result<RuleCodeGenerator, String>,
}

impl LlmSourceGenerator {
    pub fn new(generator: RuleCodeGenerator) -> Self {
        Self {
            inner: Ok(generator),
        }
    }

    pub fn unavailable(reason: &LlmError) -> Self {
        Self {
            inner: Err(reason.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_ok()
    }
}

#[async_trait]
impl SourceGenerator for LlmSourceGenerator {
    async fn generate(&self, request: &str) -> Result<String> {
        match &self.inner {
            Ok(generator) => generator
                .generate(request)
                .await
                .map_err(|e| RuleError::Generation(e.to_string())),
            Err(reason) => Err(RuleError::Generation(format!(
                "no code generator configured: {reason}"
            ))),
        }
    }
}

/// [`NotificationSink`] that hands every message to a [`Dispatcher`].
///
/// Succeeds when at least one channel accepted the message (or none are
/// configured); fails only when every channel did.
pub struct DispatcherSink {
    dispatcher: Dispatcher,
}

impl DispatcherSink {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl NotificationSink for DispatcherSink {
    async fn send(&self, owner: &str, message: &str) -> Result<()> {
        let results = self.dispatcher.dispatch(&Notification::new(owner, message)).await;
        if results.is_empty() {
            warn!(owner = %owner, "notification dropped: no channels configured");
            return Ok(());
        }
        if results.iter().any(|r| r.success) {
            return Ok(());
        }
        let errors: Vec<String> = results
            .into_iter()
            .map(|r| format!("{}: {}", r.channel, r.error.unwrap_or_default()))
            .collect();
        Err(RuleError::Dispatch(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use herald_notify::{Notifier, NotifyError};

    use super::*;

    struct Channel {
        name: &'static str,
        fail: bool,
        sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for Channel {
        async fn send(&self, _: &Notification) -> std::result::Result<(), NotifyError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Config("unreachable".into()))
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            self.name
        }
    }

    fn sink(failures: &[bool]) -> (DispatcherSink, Arc<AtomicUsize>) {
        let sent = Arc::new(AtomicUsize::new(0));
        let channels: Vec<Box<dyn Notifier>> = failures
            .iter()
            .map(|&fail| {
                Box::new(Channel {
                    name: if fail { "down" } else { "up" },
                    fail,
                    sent: sent.clone(),
                }) as Box<dyn Notifier>
            })
            .collect();
        (DispatcherSink::new(Dispatcher::new(channels)), sent)
    }

    #[tokio::test]
    async fn one_working_channel_is_enough() {
        let (sink, sent) = sink(&[true, false]);
        sink.send("alice", "hello").await.unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_channels_failing_is_a_dispatch_error() {
        let (sink, _) = sink(&[true, true]);
        let err = sink.send("alice", "hello").await.unwrap_err();
        assert!(matches!(err, RuleError::Dispatch(_)));
        assert!(err.to_string().contains("down: "));
    }

    #[tokio::test]
    async fn no_channels_is_not_an_error() {
        let (sink, _) = sink(&[]);
        sink.send("alice", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn missing_generator_reports_generation_failure() {
        let generator =
            LlmSourceGenerator::unavailable(&LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()));
        assert!(!generator.is_available());
        let err = generator.generate("tell me when it snows").await.unwrap_err();
        assert!(matches!(err, RuleError::Generation(_)));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
