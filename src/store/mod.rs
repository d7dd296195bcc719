//! Vector storage for document chunks
//!
//! This module provides:
//! - The [`VectorStore`] trait the engines are written against
//! - Structured search filters
//! - A Qdrant-backed store and an in-memory store

mod memory;
mod payload;
mod qdrant;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;

#[cfg(test)]
pub(crate) use payload::tests::sample_chunk;

use crate::error::Result;
use crate::models::DocumentChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A chunk returned by similarity search
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Structured search filters. Empty lists and `None` bounds match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
    pub library_ids: Vec<String>,
    pub authors: Vec<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub item_types: Vec<String>,
    pub tags: Vec<String>,
}

impl SearchFilter {
    pub fn for_libraries(library_ids: &[String]) -> Self {
        Self {
            library_ids: library_ids.to_vec(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SearchFilter::default()
    }

    /// Evaluate the filter against a chunk.
    ///
    /// Chunks missing a filtered field do not match that condition; chunks
    /// missing unfiltered fields are unaffected.
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        if !self.library_ids.is_empty() && !self.library_ids.contains(&chunk.library_id) {
            return false;
        }

        if !self.authors.is_empty() && !chunk.authors.iter().any(|a| self.authors.contains(a)) {
            return false;
        }

        if self.year_min.is_some() || self.year_max.is_some() {
            let Some(year) = chunk.year else {
                return false;
            };
            if self.year_min.is_some_and(|min| year < min)
                || self.year_max.is_some_and(|max| year > max)
            {
                return false;
            }
        }

        if !self.item_types.is_empty() {
            match &chunk.item_type {
                Some(t) if self.item_types.contains(t) => {}
                _ => return false,
            }
        }

        if !self.tags.is_empty() && !chunk.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        true
    }
}

/// Trait for chunk storage backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection and indexes if missing
    async fn ensure_ready(&self) -> Result<()>;

    /// Write one attachment's chunks as a single batch
    async fn upsert_chunks(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Similarity search, best score first
    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// Lowest version stored on an item's chunks, `None` if it has none
    async fn get_item_version(&self, library_id: &str, item_key: &str) -> Result<Option<i64>>;

    /// Delete an item's chunks, returning how many were removed
    async fn delete_item_chunks(&self, library_id: &str, item_key: &str) -> Result<u64>;

    /// Delete every chunk of a library
    async fn delete_library_chunks(&self, library_id: &str) -> Result<u64>;

    /// Number of chunks stored for a library
    async fn count_library_chunks(&self, library_id: &str) -> Result<u64>;

    /// Number of chunks, in any library, extracted from a PDF with this hash
    async fn count_hash_chunks(&self, attachment_hash: &str) -> Result<u64>;

    /// Item keys that have at least one chunk in the library
    async fn list_item_keys(&self, library_id: &str) -> Result<HashSet<String>>;
}

#[cfg(test)]
mod tests {
    use super::payload::tests::sample_chunk;
    use super::*;

    #[test]
    fn test_empty_filter_matches_all() {
        let filter = SearchFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&sample_chunk()));
    }

    #[test]
    fn test_library_filter() {
        let chunk = sample_chunk();
        assert!(SearchFilter::for_libraries(&["1".to_string()]).matches(&chunk));
        assert!(!SearchFilter::for_libraries(&["2".to_string()]).matches(&chunk));
    }

    #[test]
    fn test_year_range_excludes_unknown_year() {
        let mut chunk = sample_chunk();
        let filter = SearchFilter {
            year_min: Some(2020),
            year_max: Some(2022),
            ..Default::default()
        };
        assert!(filter.matches(&chunk));

        chunk.year = Some(2019);
        assert!(!filter.matches(&chunk));

        chunk.year = None;
        assert!(!filter.matches(&chunk));
    }

    #[test]
    fn test_missing_item_type_only_fails_when_filtered() {
        let mut chunk = sample_chunk();
        chunk.item_type = None;
        assert!(SearchFilter::for_libraries(&["1".to_string()]).matches(&chunk));

        let filter = SearchFilter {
            item_types: vec!["book".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&chunk));
    }

    #[test]
    fn test_author_and_tag_filters() {
        let chunk = sample_chunk();
        let filter = SearchFilter {
            authors: vec!["Ada Lovelace".to_string(), "Someone Else".to_string()],
            tags: vec!["biology".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&chunk));

        let filter = SearchFilter {
            tags: vec!["physics".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&chunk));
    }
}
