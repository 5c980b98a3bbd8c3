use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::provider::{chat_messages, ensure_success, LlmError, LlmProvider, Message};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": chat_messages(&messages),
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        debug!(url = %url, model = %self.model, "openai request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp: serde_json::Value = ensure_success(response).await?.json().await?;

        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::ParseError("missing choices[0].message.content".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
