//! In-memory store for tests and Qdrant-less runs.
//!
//! Points are kept as decoded payloads and searched by brute-force cosine
//! similarity, so reads go through the same payload codec as Qdrant.

use super::{ChunkPayload, ChunkPoint, ScoredChunk, SearchFilter, VectorStore};
use crate::error::{Error, Result};
use crate::models::DocumentChunk;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: serde_json::Map<String, serde_json::Value>,
}

impl StoredPoint {
    fn decode(&self) -> Option<DocumentChunk> {
        match ChunkPayload::from_json_map(self.payload.clone()) {
            Ok(payload) => Some(payload.into()),
            Err(e) => {
                warn!("Skipping undecodable stored chunk: {}", e);
                None
            }
        }
    }
}

/// In-memory vector store
pub struct MemoryStore {
    dimension: usize,
    points: Arc<RwLock<HashMap<Uuid, StoredPoint>>>,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a raw payload, bypassing the chunk codec on write
    pub async fn insert_raw(
        &self,
        id: Uuid,
        vector: Vec<f32>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) {
        self.points
            .write()
            .await
            .insert(id, StoredPoint { vector, payload });
    }

    /// Every decodable chunk currently stored
    pub async fn all_chunks(&self) -> Vec<DocumentChunk> {
        self.points
            .read()
            .await
            .values()
            .filter_map(StoredPoint::decode)
            .collect()
    }

    async fn retain<F>(&self, keep: F) -> u64
    where
        F: Fn(&DocumentChunk) -> bool,
    {
        let mut points = self.points.write().await;
        let before = points.len();
        points.retain(|_, p| p.decode().map(|c| keep(&c)).unwrap_or(true));
        (before - points.len()) as u64
    }

    async fn count<F>(&self, pred: F) -> u64
    where
        F: Fn(&DocumentChunk) -> bool,
    {
        self.points
            .read()
            .await
            .values()
            .filter_map(StoredPoint::decode)
            .filter(|c| pred(c))
            .count() as u64
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_ready(&self) -> Result<()> {
        debug!("MemoryStore ready (dimension: {})", self.dimension);
        Ok(())
    }

    async fn upsert_chunks(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if let Some(bad) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::VectorStore(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.vector.len()
            )));
        }

        let mut encoded = Vec::with_capacity(points.len());
        for point in points {
            let serde_json::Value::Object(payload) = serde_json::to_value(&point.payload)? else {
                return Err(Error::VectorStore("Payload is not an object".to_string()));
            };
            encoded.push((point.id, StoredPoint { vector: point.vector, payload }));
        }

        // One write lock for the whole batch
        let mut store = self.points.write().await;
        debug!("Upserting {} points", encoded.len());
        store.extend(encoded);
        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let points = self.points.read().await;
        let mut results: Vec<ScoredChunk> = points
            .values()
            .filter_map(|p| {
                let chunk = p.decode()?;
                if !filter.matches(&chunk) {
                    return None;
                }
                let score = Self::cosine_similarity(&query_vector, &p.vector);
                (score >= score_threshold).then_some(ScoredChunk { chunk, score })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn get_item_version(&self, library_id: &str, item_key: &str) -> Result<Option<i64>> {
        let points = self.points.read().await;
        Ok(points
            .values()
            .filter_map(StoredPoint::decode)
            .filter(|c| c.library_id == library_id && c.item_key == item_key)
            .map(|c| super::effective_item_version(&c))
            .min())
    }

    async fn delete_item_chunks(&self, library_id: &str, item_key: &str) -> Result<u64> {
        Ok(self
            .retain(|c| !(c.library_id == library_id && c.item_key == item_key))
            .await)
    }

    async fn delete_library_chunks(&self, library_id: &str) -> Result<u64> {
        Ok(self.retain(|c| c.library_id != library_id).await)
    }

    async fn count_library_chunks(&self, library_id: &str) -> Result<u64> {
        Ok(self.count(|c| c.library_id == library_id).await)
    }

    async fn count_hash_chunks(&self, attachment_hash: &str) -> Result<u64> {
        Ok(self
            .count(|c| c.attachment_hash.as_deref() == Some(attachment_hash))
            .await)
    }

    async fn list_item_keys(&self, library_id: &str) -> Result<HashSet<String>> {
        let points = self.points.read().await;
        Ok(points
            .values()
            .filter_map(StoredPoint::decode)
            .filter(|c| c.library_id == library_id)
            .map(|c| c.item_key)
            .collect())
    }
}
