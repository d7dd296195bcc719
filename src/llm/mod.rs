//! Answer generation
//!
//! A single capability, `generate(prompt, max_tokens, temperature)`, with
//! local and remote variants chosen from configuration.

mod chat;

pub use chat::*;

use crate::config::{api_key_from_env, LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Trait for text generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a generator based on configuration
///
/// `Local` targets an OpenAI-compatible server on this machine (Ollama,
/// llama.cpp, LM Studio) without credentials. `Remote` requires an API key.
pub fn create_generator(config: &LlmConfig, timeout: Duration) -> Result<Arc<dyn Generator>> {
    match config.provider {
        LlmProvider::Local => {
            info!("Using local generation: {} at {}", config.model, config.url);
            Ok(Arc::new(ChatCompletionsGenerator::new(config, None, timeout)?))
        }
        LlmProvider::Remote => {
            let api_key = api_key_from_env(&config.api_key_env).ok_or_else(|| {
                Error::Config(format!(
                    "Remote generation needs an API key in ${}",
                    config.api_key_env
                ))
            })?;
            info!("Using remote generation: {} at {}", config.model, config.url);
            Ok(Arc::new(ChatCompletionsGenerator::new(
                config,
                Some(api_key),
                timeout,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_without_key_is_config_error() {
        let config = LlmConfig {
            provider: LlmProvider::Remote,
            api_key_env: "ZOTERO_RAG_TEST_MISSING_LLM_KEY".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_generator(&config, Duration::from_secs(5)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_local_needs_no_key() {
        let generator = create_generator(&LlmConfig::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(generator.model_name(), LlmConfig::default().model);
    }
}
