//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - Collection and payload index management
//! - Batched point upsert and filtered deletes
//! - Filtered vector search

use super::{
    item_version_from_qdrant, payload_from_qdrant, ChunkPoint, ScoredChunk, SearchFilter,
    VectorStore,
};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::with_payload_selector::SelectorOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PayloadIncludeSelector, PointId, Range,
    RetrievedPoint, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, WithPayloadSelector,
};
use qdrant_client::Qdrant;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const SCROLL_BATCH: u32 = 256;

/// Payload fields with keyword indexes
const KEYWORD_INDEXES: &[&str] = &[
    "library_id",
    "item_key",
    "attachment_key",
    "attachment_hash",
    "authors",
    "tags",
    "item_type",
];

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            &config.collection_name,
            config.embedding.dimension,
        )
    }

    /// Create a new store connection directly with URL and collection name
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// Get the expected vector dimension for this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn scroll_all(
        &self,
        filter: Filter,
        payload: WithPayloadSelector,
    ) -> Result<Vec<RetrievedPoint>> {
        let mut all = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut scroll_builder = ScrollPointsBuilder::new(&self.collection)
                .filter(filter.clone())
                .limit(SCROLL_BATCH)
                .with_vectors(false);

            if let Some(ref selector) = payload.selector_options {
                scroll_builder = scroll_builder.with_payload(selector.clone());
            }

            if let Some(ref o) = offset {
                scroll_builder = scroll_builder.offset(o.clone());
            }

            let response = self.client.scroll(scroll_builder).await?;
            if response.result.is_empty() {
                break;
            }
            all.extend(response.result);

            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(all)
    }

    /// Points matching the filter, carrying only one payload field
    async fn scroll_field(&self, filter: Filter, field: &str) -> Result<Vec<RetrievedPoint>> {
        self.scroll_all(filter, only_field(field)).await
    }

    async fn count(&self, filter: Filter) -> Result<u64> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn delete_matching(&self, filter: Filter) -> Result<u64> {
        let count = self.count(filter.clone()).await?;
        if count == 0 {
            return Ok(0);
        }

        debug!("Deleting {} points from collection {}", count, self.collection);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await?;
        Ok(count)
    }
}

fn item_filter(library_id: &str, item_key: &str) -> Filter {
    Filter::must([
        Condition::matches("library_id", library_id.to_string()),
        Condition::matches("item_key", item_key.to_string()),
    ])
}

fn only_field(field: &str) -> WithPayloadSelector {
    WithPayloadSelector {
        selector_options: Some(SelectorOptions::Include(PayloadIncludeSelector {
            fields: vec![field.to_string()],
        })),
    }
}

fn library_filter(library_id: &str) -> Filter {
    Filter::must([Condition::matches("library_id", library_id.to_string())])
}

impl SearchFilter {
    /// Translate to a Qdrant filter, `None` when nothing is filtered
    pub fn to_qdrant_filter(&self) -> Option<Filter> {
        let mut must_conditions: Vec<Condition> = Vec::new();

        if !self.library_ids.is_empty() {
            must_conditions.push(Condition::matches("library_id", self.library_ids.clone()));
        }

        if !self.authors.is_empty() {
            must_conditions.push(Condition::matches("authors", self.authors.clone()));
        }

        if self.year_min.is_some() || self.year_max.is_some() {
            must_conditions.push(Condition::range(
                "year",
                Range {
                    gte: self.year_min.map(f64::from),
                    lte: self.year_max.map(f64::from),
                    ..Default::default()
                },
            ));
        }

        if !self.item_types.is_empty() {
            must_conditions.push(Condition::matches("item_type", self.item_types.clone()));
        }

        if !self.tags.is_empty() {
            must_conditions.push(Condition::matches("tags", self.tags.clone()));
        }

        if must_conditions.is_empty() {
            return None;
        }

        Some(Filter::must(must_conditions))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_ready(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(vectors_config),
            )
            .await?;

        for field in KEYWORD_INDEXES {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    *field,
                    FieldType::Keyword,
                ))
                .await?;
        }
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "year",
                FieldType::Integer,
            ))
            .await?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn upsert_chunks(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::VectorStore(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs = points.into_iter().map(|p| p.to_point_struct()).collect::<Vec<_>>();

        // Single request with wait so the batch becomes visible at once
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs).wait(true))
            .await?;

        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
                .with_payload(true)
                .score_threshold(score_threshold);

        if let Some(qdrant_filter) = filter.to_qdrant_filter() {
            search_builder = search_builder.filter(qdrant_filter);
        }

        let response = self.client.search_points(search_builder).await?;

        let results = response
            .result
            .into_iter()
            .filter_map(|p| match payload_from_qdrant(p.payload) {
                Ok(payload) => Some(ScoredChunk {
                    chunk: payload.into(),
                    score: p.score,
                }),
                Err(e) => {
                    warn!("Skipping undecodable search hit: {}", e);
                    None
                }
            })
            .collect();

        Ok(results)
    }

    async fn get_item_version(&self, library_id: &str, item_key: &str) -> Result<Option<i64>> {
        let points = self
            .scroll_field(item_filter(library_id, item_key), "item_version")
            .await?;
        Ok(points
            .iter()
            .map(|p| item_version_from_qdrant(&p.payload))
            .min())
    }

    async fn delete_item_chunks(&self, library_id: &str, item_key: &str) -> Result<u64> {
        self.delete_matching(item_filter(library_id, item_key)).await
    }

    async fn delete_library_chunks(&self, library_id: &str) -> Result<u64> {
        self.delete_matching(library_filter(library_id)).await
    }

    async fn count_library_chunks(&self, library_id: &str) -> Result<u64> {
        self.count(library_filter(library_id)).await
    }

    async fn count_hash_chunks(&self, attachment_hash: &str) -> Result<u64> {
        self.count(Filter::must([Condition::matches(
            "attachment_hash",
            attachment_hash.to_string(),
        )]))
        .await
    }

    async fn list_item_keys(&self, library_id: &str) -> Result<HashSet<String>> {
        use qdrant_client::qdrant::value::Kind;

        Ok(self
            .scroll_field(library_filter(library_id), "item_key")
            .await?
            .into_iter()
            .filter_map(|mut p| match p.payload.remove("item_key")?.kind {
                Some(Kind::StringValue(key)) => Some(key),
                _ => None,
            })
            .collect())
    }
}
