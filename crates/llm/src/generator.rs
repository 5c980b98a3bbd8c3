//! Turns a natural-language notification request into rule source.

use herald_core::config::{LlmConfig, OllamaConfig};
use tracing::{debug, info};

use crate::provider::{LlmError, LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You write notification rules in Rust.

A rule is a single public struct that derives Default and implements this trait,
which is already in scope (do not declare or import it):

    pub trait NotificationRule: Send + Sync {
        fn evaluate(&self, context: &NotificationContext) -> bool;
        fn describe(&self, context: &NotificationContext) -> String;
    }

`evaluate` decides whether the user should be notified. `describe` returns the
message sent when `evaluate` returned true.

NotificationContext has four public DataGroup fields (`weather`, `market`,
`news`, `custom`) and `timestamp_ms: i64`. DataGroup lookups all return Option:
    get(key) -> Option<&Value>
    number(key) -> Option<f64>
    text(key) -> Option<&str>
    flag(key) -> Option<bool>
    list(key) -> Option<&[Value]>
Value is an enum (Null, Bool, Number, Text, List, Map) with as_f64, as_str,
as_bool, as_list, as_map and a Display impl.

Example data:
- weather: {"temperature": -5.0, "condition": "Clear", "humidity": 40, "wind_speed": 3.2}
- market: {"symbol": "KOSPI", "price": 3100.5, "change": 12.3, "change_percent": 0.4}
- news: {"headlines": ["...", "..."], "count": 2}

Rules:
1. Declare exactly one `pub struct` at the top level, with a meaningful name
   such as ColdWeatherRule, starting at column 0. Helper types must not be
   `pub`.
2. Only the standard library is available. No file, network, process or
   environment access, no unsafe code, no threads.
3. Treat missing data as "do not notify" instead of panicking.
4. Reply with the code only, in one ```rust block, without explanation."#;

/// Generates rule source through the configured text-generation backend.
pub struct RuleCodeGenerator {
    provider: Box<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl RuleCodeGenerator {
    pub fn new(provider: Box<dyn LlmProvider>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    /// Build from config, creating the appropriate provider.
    pub fn from_config(llm_config: &LlmConfig, ollama_config: &OllamaConfig) -> Result<Self, LlmError> {
        let provider = crate::providers::create_provider(llm_config, ollama_config)?;
        Ok(Self::new(provider, llm_config.temperature, llm_config.max_tokens))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Ask the model for a rule implementing `request` and return its source.
    pub async fn generate(&self, request: &str) -> Result<String, LlmError> {
        info!(provider = self.provider.name(), "generating rule source");

        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt(request))];
        let response = self
            .provider
            .complete(messages, self.temperature, self.max_tokens)
            .await?;
        debug!(bytes = response.len(), "model response received");

        let code = extract_code(&response);
        if code.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        info!(bytes = code.len(), "rule source generated");
        Ok(code.to_string())
    }
}

fn user_prompt(request: &str) -> String {
    format!("Write a notification rule for this request:\n\n\"{}\"", request.trim())
}

/// Code from a ```rust fence, else any ``` fence, else the whole reply.
///
/// The block runs from the end of the opening fence line to the last fence in
/// the reply.
pub fn extract_code(response: &str) -> &str {
    let start = response
        .find("```rust")
        .or_else(|| response.find("```"))
        .map(|fence| match response[fence..].find('\n') {
            Some(eol) => fence + eol + 1,
            None => response.len(),
        });

    if let Some(start) = start {
        if let Some(end) = response.rfind("```") {
            if end >= start {
                return response[start..end].trim();
            }
        }
    }
    response.trim()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::Role;

    struct MockProvider {
        reply: Result<String, u16>,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Message>>>,
    }

    impl MockProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                ..Self::replying("")
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(
            &self,
            messages: Vec<Message>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = messages;
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(LlmError::ApiError {
                    status: *status,
                    body: "overloaded".into(),
                }),
            }
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[test]
    fn extracts_rust_fence() {
        let reply = "Here you go:\n```rust\npub struct A;\n```\nEnjoy.";
        assert_eq!(extract_code(reply), "pub struct A;");
    }

    #[test]
    fn extracts_bare_fence() {
        let reply = "```\n#[derive(Default)]\npub struct B;\n```";
        assert_eq!(extract_code(reply), "#[derive(Default)]\npub struct B;");
    }

    #[test]
    fn other_language_tag_is_skipped() {
        let reply = "```rs\npub struct C;\n```";
        assert_eq!(extract_code(reply), "pub struct C;");
    }

    #[test]
    fn unfenced_reply_is_used_whole() {
        assert_eq!(extract_code("  pub struct D;\n"), "pub struct D;");
    }

    #[test]
    fn unterminated_fence_falls_back_to_whole_text() {
        let reply = "```rust\npub struct E;";
        assert_eq!(extract_code(reply), reply);
    }

    #[tokio::test]
    async fn generate_sends_contract_and_request() {
        let provider = MockProvider::replying("```rust\npub struct ColdRule;\n```");
        let calls = Arc::clone(&provider.calls);
        let seen = Arc::clone(&provider.seen);
        let generator = RuleCodeGenerator::new(Box::new(provider), 0.0, 2048);

        let code = generator.generate("tell me when it freezes").await.unwrap();
        assert_eq!(code, "pub struct ColdRule;");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let messages = seen.lock().unwrap().clone();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("NotificationRule"));
        assert!(messages[0].content.contains("derives Default"));
        assert!(messages[1].content.contains("tell me when it freezes"));
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let generator = RuleCodeGenerator::new(Box::new(MockProvider::replying("```rust\n```")), 0.0, 64);
        assert!(matches!(
            generator.generate("anything").await,
            Err(LlmError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let generator = RuleCodeGenerator::new(Box::new(MockProvider::failing(529)), 0.0, 64);
        let err = generator.generate("anything").await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { status: 529, .. }));
    }
}
