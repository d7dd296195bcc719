//! FastEmbed implementation for local embeddings

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// FastEmbed-based embedder
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

/// Map a configured model name to a fastembed model and its dimension
pub fn fastembed_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name {
        "sentence-transformers/all-MiniLM-L6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "BAAI/bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "BAAI/bge-large-en-v1.5" => Some((EmbeddingModel::BGELargeENV15, 1024)),
        "nomic-ai/nomic-embed-text-v1.5" => Some((EmbeddingModel::NomicEmbedTextV15, 768)),
        _ => None,
    }
}

impl FastEmbedder {
    /// Create a new FastEmbed embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        info!("Initializing FastEmbed with model: {}", config.model);

        let (model_enum, dimension) = fastembed_model(&config.model).ok_or_else(|| {
            Error::Config(format!(
                "Model '{}' is not available for local fastembed inference",
                config.model
            ))
        })?;

        if dimension != config.dimension {
            return Err(Error::Config(format!(
                "embedding.dimension is {} but '{}' produces {}",
                config.dimension, config.model, dimension
            )));
        }

        let options = InitOptions::new(model_enum).with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| Error::Embedding(format!("Failed to initialize model: {}", e)))?;

        info!("FastEmbed model loaded successfully");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: config.model.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts", texts.len());

        // FastEmbed is synchronous, so we wrap in blocking task
        let model = self.model.clone();
        let embeddings = tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(texts, None)
        })
        .await
        .map_err(|e| Error::Embedding(format!("Task join error: {}", e)))?
        .map_err(|e| Error::Embedding(format!("Embedding failed: {}", e)))?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
