use super::Generator;
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const SYSTEM_PROMPT: &str = "You are a research assistant. Answer strictly from the provided \
context and cite sources by their bracketed number.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &LlmConfig, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            config.url.trim_end_matches('/')
        ))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens,
            temperature,
            stream: false,
        };

        debug!("Requesting completion from {} ({})", self.endpoint, self.model);

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("Bad response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| Error::Generation("Model returned no content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            url: format!("{}/v1", server.uri()),
            model: "tiny".to_string(),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_sends_parameters_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "model": "tiny",
                "max_tokens": 64,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  Chlorophyll [1].  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = ChatCompletionsGenerator::new(
            &config_for(&server),
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let answer = generator.generate("question", 64, 0.2).await.unwrap();
        assert_eq!(answer, "Chlorophyll [1].");
    }

    #[tokio::test]
    async fn test_error_status_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let generator =
            ChatCompletionsGenerator::new(&config_for(&server), None, Duration::from_secs(5))
                .unwrap();
        let err = generator.generate("q", 16, 0.0).await.unwrap_err();
        match err {
            Error::Generation(msg) => assert!(msg.contains("overloaded")),
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let generator =
            ChatCompletionsGenerator::new(&config_for(&server), None, Duration::from_secs(5))
                .unwrap();
        assert!(generator.generate("q", 16, 0.0).await.is_err());
    }
}
