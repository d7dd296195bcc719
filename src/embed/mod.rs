//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - A local/remote provider factory
//! - HTTP (OpenAI-compatible) and optional in-process fastembed backends
//! - A content-hash keyed cache in front of either backend

mod cache;
#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod http_backend;

pub use cache::*;
#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use http_backend::*;

use crate::config::{api_key_from_env, EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
///
/// `Remote` always talks HTTP with an API key. `Local` runs fastembed in
/// process when built with `local-embed`, otherwise it expects an
/// OpenAI-compatible sidecar at `embedding.url`.
pub fn create_embedder(config: &EmbeddingConfig, timeout: Duration) -> Result<Arc<dyn Embedder>> {
    let backend: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Remote => {
            let api_key = api_key_from_env(&config.api_key_env).ok_or_else(|| {
                Error::Config(format!(
                    "Remote embeddings need an API key in ${}",
                    config.api_key_env
                ))
            })?;
            info!("Using remote embeddings: {} at {}", config.model, config.url);
            Arc::new(HttpEmbedder::new(config, Some(api_key), timeout)?)
        }
        EmbeddingProvider::Local => create_local_embedder(config, timeout)?,
    };

    if config.cache_enabled {
        debug!("Embedding cache enabled ({} entries)", config.cache_capacity);
        Ok(Arc::new(CachedEmbedder::with_capacity(
            backend,
            config.cache_capacity,
        )))
    } else {
        Ok(backend)
    }
}

#[cfg(feature = "local-embed")]
fn create_local_embedder(config: &EmbeddingConfig, _timeout: Duration) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(FastEmbedder::new(config)?))
}

#[cfg(not(feature = "local-embed"))]
fn create_local_embedder(config: &EmbeddingConfig, timeout: Duration) -> Result<Arc<dyn Embedder>> {
    info!("Using local embedding sidecar: {} at {}", config.model, config.url);
    Ok(Arc::new(HttpEmbedder::new(config, None, timeout)?))
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let embeddings = embedder.embed_batch(batch_texts).await?;
        if embeddings.len() != chunk.len() {
            return Err(Error::Embedding(format!(
                "Backend returned {} embeddings for {} texts",
                embeddings.len(),
                chunk.len()
            )));
        }
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}
