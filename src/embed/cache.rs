//! Embedding cache keyed by content hash
//!
//! Re-indexing an updated item usually re-embeds mostly unchanged text, so
//! vectors are kept per blake3 hash of (model, text).

use super::Embedder;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Vec<f32>>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    stats: CacheStats,
}

/// Embedder wrapper that serves repeated texts from memory
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl CachedEmbedder {
    pub fn with_capacity(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn key(&self, text: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let keys: Vec<String> = texts.iter().map(|t| self.key(t)).collect();
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing_texts = Vec::new();
        let mut missing_idx = Vec::new();

        {
            let mut state = self.state.lock().await;
            for (i, key) in keys.iter().enumerate() {
                match state.entries.get(key).cloned() {
                    Some(vector) => {
                        state.stats.hits += 1;
                        results.push(Some(vector));
                    }
                    None => {
                        state.stats.misses += 1;
                        results.push(None);
                        missing_texts.push(texts[i].clone());
                        missing_idx.push(i);
                    }
                }
            }
        }

        if !missing_texts.is_empty() {
            debug!("Embedding cache miss for {} of {} texts", missing_texts.len(), texts.len());
            let fresh = self.inner.embed_batch(missing_texts).await?;

            let mut state = self.state.lock().await;
            for (idx, vector) in missing_idx.into_iter().zip(fresh) {
                let key = keys[idx].clone();
                if !state.entries.contains_key(&key) {
                    while state.entries.len() >= self.capacity {
                        match state.order.pop_front() {
                            Some(old) => {
                                state.entries.remove(&old);
                                state.stats.evictions += 1;
                            }
                            None => break,
                        }
                    }
                    state.order.push_back(key.clone());
                    state.entries.insert(key, vector.clone());
                }
                results[idx] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
