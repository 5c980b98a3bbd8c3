pub mod claude;
pub mod ollama;
pub mod openai;

use herald_core::config::{LlmConfig, OllamaConfig};

use crate::provider::{LlmError, LlmProvider};

/// Create the provider named by `llm_config.provider`.
pub fn create_provider(
    llm_config: &LlmConfig,
    ollama_config: &OllamaConfig,
) -> Result<Box<dyn LlmProvider>, LlmError> {
    match llm_config.provider.as_str() {
        "openai" => {
            let api_key = llm_config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            let base_url = llm_config
                .openai_base_url
                .as_deref()
                .unwrap_or(openai::DEFAULT_BASE_URL);
            Ok(Box::new(openai::OpenAiProvider::new(
                api_key.clone(),
                llm_config.openai_model.clone(),
                base_url.to_string(),
            )))
        }
        "anthropic" | "claude" => {
            let api_key = llm_config
                .anthropic_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            let base_url = llm_config
                .anthropic_base_url
                .as_deref()
                .unwrap_or(claude::DEFAULT_BASE_URL);
            Ok(Box::new(claude::ClaudeProvider::new(
                api_key.clone(),
                llm_config.anthropic_model.clone(),
                base_url.to_string(),
            )))
        }
        "ollama" => Ok(Box::new(ollama::OllamaProvider::new(
            ollama_config.url.clone(),
            ollama_config.model.clone(),
        ))),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            openai_api_key: None,
            openai_model: "gpt-4o".into(),
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_model: "claude".into(),
            anthropic_base_url: None,
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    fn ollama() -> OllamaConfig {
        OllamaConfig {
            url: "http://localhost:11434".into(),
            model: "qwen2.5-coder".into(),
        }
    }

    #[test]
    fn missing_keys_are_reported() {
        for name in ["anthropic", "openai"] {
            let err = create_provider(&llm(name), &ollama()).err().unwrap();
            assert!(matches!(err, LlmError::NotConfigured(_)), "{name}");
        }
    }

    #[test]
    fn selects_by_name() {
        let mut config = llm("claude");
        config.anthropic_api_key = Some("sk-test".into());
        assert_eq!(create_provider(&config, &ollama()).unwrap().name(), "anthropic");

        let mut config = llm("openai");
        config.openai_api_key = Some("sk-test".into());
        assert_eq!(create_provider(&config, &ollama()).unwrap().name(), "openai");

        assert_eq!(create_provider(&llm("ollama"), &ollama()).unwrap().name(), "ollama");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = create_provider(&llm("gemini"), &ollama()).err().unwrap();
        assert!(err.to_string().contains("gemini"));
    }
}
