use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Data { data: Vec<EmbeddingData> },
    Embeddings { embeddings: Vec<Vec<f32>> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Data { mut data } => {
                // OpenAI does not promise ordering; index does
                data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
                data.into_iter().map(|d| d.embedding).collect()
            }
        }
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model_id: String,
    dimension: usize,
    retries: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}/embeddings", config.url.trim_end_matches('/')))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model_id: config.model.clone(),
            dimension: config.dimension,
            retries: 2,
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_id,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }

    async fn send_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::Embedding("Failed to clone embedding request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        return ok
                            .json::<T>()
                            .await
                            .map_err(|e| Error::Embedding(format!("Bad response body: {}", e)))
                    }
                    Err(e) => last_err = Some(Error::Embedding(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Embedding(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Embedding("Embedding backend request failed".to_string())
        }))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingsRequest {
            model: &self.model_id,
            input: texts,
        };
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let parsed: EmbeddingResponse = self.send_with_retry(request).await?;
        let embeddings = parsed.into_embeddings();
        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
