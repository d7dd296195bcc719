//! Default values for configuration

use super::{EmbeddingProvider, LlmProvider};
use crate::models::AnswerFormat;

/// Default Zotero local API URL
pub fn default_zotero_url() -> String {
    std::env::var("ZOTERO_URL").unwrap_or_else(|_| "http://localhost:23119".to_string())
}

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "document_chunks".to_string()
}

pub fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Local
}

/// Default embedding model (CPU friendly)
pub fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding base URL (local OpenAI-compatible sidecar)
pub fn default_embedding_url() -> String {
    std::env::var("ZOTERO_RAG_EMBEDDING_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997/v1".to_string())
}

pub fn default_cache_enabled() -> bool {
    true
}

/// Default number of cached embeddings kept in memory
pub fn default_cache_capacity() -> usize {
    10_000
}

pub fn default_llm_provider() -> LlmProvider {
    LlmProvider::Local
}

pub fn default_llm_model() -> String {
    "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string()
}

/// Default chat endpoint (local OpenAI-compatible server)
pub fn default_llm_url() -> String {
    std::env::var("ZOTERO_RAG_LLM_URL").unwrap_or_else(|_| "http://127.0.0.1:11434/v1".to_string())
}

pub fn default_llm_max_tokens() -> u32 {
    512
}

pub fn default_llm_temperature() -> f32 {
    0.7
}

/// Default context budget in characters (~2k tokens)
pub fn default_llm_max_context_chars() -> usize {
    6_000
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    512
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    50
}

/// Words kept in a chunk's text preview
pub fn default_preview_words() -> usize {
    5
}

/// Default number of chunks retrieved per query
pub fn default_query_top_k() -> usize {
    5
}

/// Default maximum results allowed per query
pub fn default_query_max_top_k() -> usize {
    50
}

/// Default minimum similarity score
pub fn default_query_min_score() -> f32 {
    0.5
}

pub fn default_answer_format() -> AnswerFormat {
    AnswerFormat::Markdown
}

/// Default per-request timeout in seconds
pub fn default_request_timeout() -> u64 {
    30
}

/// Default server bind address
pub fn default_server_bind() -> String {
    "127.0.0.1:8119".to_string()
}
