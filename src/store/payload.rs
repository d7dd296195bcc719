//! Payload schema for stored chunks
//!
//! Every field added after the first release is optional here, so points
//! written by older versions still decode. Missing version numbers are
//! interpreted in exactly one place, [`effective_version`].

use crate::models::DocumentChunk;
use qdrant_client::qdrant::{ListValue, PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Version assumed for chunks stored without version metadata
pub const LEGACY_VERSION: i64 = 0;

/// Version a stored chunk counts as when compared against the content store
pub fn effective_item_version(chunk: &DocumentChunk) -> i64 {
    effective_version(chunk.item_version)
}

fn effective_version(stored: Option<i64>) -> i64 {
    stored.unwrap_or(LEGACY_VERSION)
}

/// Item version of a point fetched with only its `item_version` field
pub(crate) fn item_version_from_qdrant(payload: &HashMap<String, QdrantValue>) -> i64 {
    use qdrant_client::qdrant::value::Kind;

    let stored = payload
        .get("item_version")
        .and_then(|v| match v.kind {
            Some(Kind::IntegerValue(i)) => Some(i),
            Some(Kind::DoubleValue(d)) => Some(d as i64),
            _ => None,
        });
    effective_version(stored)
}

/// Stable point id for a chunk id
pub fn point_id_for(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
}

/// A point ready to be upserted
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    pub fn new(chunk: &DocumentChunk, vector: Vec<f32>) -> Self {
        Self {
            id: point_id_for(&chunk.chunk_id),
            vector,
            payload: ChunkPayload::from(chunk),
        }
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub library_id: String,
    pub item_key: String,
    pub attachment_key: String,
    pub text: String,
    pub content_hash: String,
    pub chunk_index: u32,
    pub text_preview: String,
    pub title: String,
    pub authors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_version: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_version: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
}

impl From<&DocumentChunk> for ChunkPayload {
    fn from(chunk: &DocumentChunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            library_id: chunk.library_id.clone(),
            item_key: chunk.item_key.clone(),
            attachment_key: chunk.attachment_key.clone(),
            text: chunk.text.clone(),
            content_hash: chunk.content_hash.clone(),
            chunk_index: chunk.chunk_index,
            text_preview: chunk.text_preview.clone(),
            title: chunk.title.clone(),
            authors: chunk.authors.clone(),
            page_number: chunk.page_number,
            year: chunk.year,
            item_type: chunk.item_type.clone(),
            publication: chunk.publication.clone(),
            tags: chunk.tags.clone(),
            attachment_hash: chunk.attachment_hash.clone(),
            item_version: chunk.item_version,
            attachment_version: chunk.attachment_version,
            indexed_at: chunk.indexed_at.clone(),
        }
    }
}

impl From<ChunkPayload> for DocumentChunk {
    fn from(payload: ChunkPayload) -> Self {
        // Chunks from before ids were stored get their positional id back
        let chunk_id = if payload.chunk_id.is_empty() {
            DocumentChunk::make_id(
                &payload.library_id,
                &payload.item_key,
                &payload.attachment_key,
                payload.chunk_index,
            )
        } else {
            payload.chunk_id
        };

        Self {
            chunk_id,
            text: payload.text,
            content_hash: payload.content_hash,
            library_id: payload.library_id,
            item_key: payload.item_key,
            attachment_key: payload.attachment_key,
            page_number: payload.page_number,
            chunk_index: payload.chunk_index,
            text_preview: payload.text_preview,
            title: payload.title,
            authors: payload.authors,
            year: payload.year,
            item_type: payload.item_type,
            publication: payload.publication,
            tags: payload.tags,
            attachment_hash: payload.attachment_hash,
            item_version: payload.item_version,
            attachment_version: payload.attachment_version,
            indexed_at: payload.indexed_at,
        }
    }
}

impl ChunkPayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("chunk_id".to_string(), string_to_qdrant(&self.chunk_id));
        map.insert("library_id".to_string(), string_to_qdrant(&self.library_id));
        map.insert("item_key".to_string(), string_to_qdrant(&self.item_key));
        map.insert(
            "attachment_key".to_string(),
            string_to_qdrant(&self.attachment_key),
        );
        map.insert("text".to_string(), string_to_qdrant(&self.text));
        map.insert("content_hash".to_string(), string_to_qdrant(&self.content_hash));
        map.insert(
            "chunk_index".to_string(),
            int_to_qdrant(self.chunk_index as i64),
        );
        map.insert("text_preview".to_string(), string_to_qdrant(&self.text_preview));
        map.insert("title".to_string(), string_to_qdrant(&self.title));
        map.insert("authors".to_string(), list_to_qdrant(&self.authors));

        if let Some(page) = self.page_number {
            map.insert("page_number".to_string(), int_to_qdrant(page as i64));
        }
        if let Some(year) = self.year {
            map.insert("year".to_string(), int_to_qdrant(year as i64));
        }
        if let Some(ref item_type) = self.item_type {
            map.insert("item_type".to_string(), string_to_qdrant(item_type));
        }
        if let Some(ref publication) = self.publication {
            map.insert("publication".to_string(), string_to_qdrant(publication));
        }
        if !self.tags.is_empty() {
            map.insert("tags".to_string(), list_to_qdrant(&self.tags));
        }
        if let Some(ref hash) = self.attachment_hash {
            map.insert("attachment_hash".to_string(), string_to_qdrant(hash));
        }
        if let Some(version) = self.item_version {
            map.insert("item_version".to_string(), int_to_qdrant(version));
        }
        if let Some(version) = self.attachment_version {
            map.insert("attachment_version".to_string(), int_to_qdrant(version));
        }
        if let Some(ref indexed_at) = self.indexed_at {
            map.insert("indexed_at".to_string(), string_to_qdrant(indexed_at));
        }

        map
    }

    /// Decode a payload read back from storage
    pub fn from_json_map(map: Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(map))
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(s.to_string())),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

fn list_to_qdrant(items: &[String]) -> QdrantValue {
    let values: Vec<QdrantValue> = items.iter().map(|s| string_to_qdrant(s)).collect();
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::ListValue(ListValue {
            values,
        })),
    }
}

/// Convert Qdrant value to serde_json Value
pub(crate) fn json_from_qdrant_value(v: QdrantValue) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

/// Decode a Qdrant payload map
pub(crate) fn payload_from_qdrant(
    payload: HashMap<String, QdrantValue>,
) -> serde_json::Result<ChunkPayload> {
    ChunkPayload::from_json_map(
        payload
            .into_iter()
            .map(|(k, v)| (k, json_from_qdrant_value(v)))
            .collect(),
    )
}
