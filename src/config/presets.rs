//! Named hardware presets
//!
//! A preset bundles embedding, generation and retrieval settings for a
//! machine profile. Selecting one is a plain lookup that returns concrete
//! config sections; nothing checks the backends at runtime.

use super::{EmbeddingConfig, EmbeddingProvider, LlmConfig, LlmProvider};
use crate::error::{Error, Result};

/// A complete preset
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub top_k: usize,
    pub min_score: f32,
    pub chunk_max_chars: usize,
}

/// Names of all presets, in display order
pub fn list_presets() -> Vec<&'static str> {
    vec![
        "mac-mini-m4-16gb",
        "gpu-high-memory",
        "cpu-only",
        "remote-openai",
        "remote-kisski",
    ]
}

/// Look up a preset by name
pub fn get_preset(name: &str) -> Result<Preset> {
    let preset = match name {
        "mac-mini-m4-16gb" => Preset {
            name: "mac-mini-m4-16gb",
            description: "Optimized for Mac Mini M4 with 16GB RAM",
            embedding: local_embedding("nomic-ai/nomic-embed-text-v1.5", 768, 32),
            llm: local_llm("Qwen/Qwen2.5-3B-Instruct", 4096),
            top_k: 5,
            min_score: 0.7,
            chunk_max_chars: 512,
        },
        "gpu-high-memory" => Preset {
            name: "gpu-high-memory",
            description: "For systems with a dedicated GPU and more than 24GB RAM",
            embedding: local_embedding("sentence-transformers/all-mpnet-base-v2", 768, 64),
            llm: local_llm("mistralai/Mistral-7B-Instruct-v0.3", 8192),
            top_k: 10,
            min_score: 0.65,
            chunk_max_chars: 768,
        },
        "cpu-only" => Preset {
            name: "cpu-only",
            description: "CPU-optimized smaller models",
            embedding: local_embedding("sentence-transformers/all-MiniLM-L6-v2", 384, 16),
            llm: local_llm("TinyLlama/TinyLlama-1.1B-Chat-v1.0", 2048),
            top_k: 5,
            min_score: 0.7,
            chunk_max_chars: 384,
        },
        "remote-openai" => Preset {
            name: "remote-openai",
            description: "OpenAI remote inference endpoints",
            embedding: EmbeddingConfig {
                provider: EmbeddingProvider::Remote,
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                batch_size: 100,
                url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                ..EmbeddingConfig::default()
            },
            llm: remote_llm(
                "gpt-4o-mini",
                "https://api.openai.com/v1",
                "OPENAI_API_KEY",
                128_000,
            ),
            top_k: 10,
            min_score: 0.7,
            chunk_max_chars: 1024,
        },
        "remote-kisski" => Preset {
            name: "remote-kisski",
            description: "GWDG KISSKI OpenAI-compatible API (Academic Cloud)",
            embedding: local_embedding("sentence-transformers/all-MiniLM-L6-v2", 384, 32),
            llm: remote_llm(
                "meta-llama/Llama-3.3-70B-Instruct",
                "https://chat-ai.academiccloud.de/v1",
                "KISSKI_API_KEY",
                128_000,
            ),
            top_k: 10,
            min_score: 0.7,
            chunk_max_chars: 1024,
        },
        _ => {
            return Err(Error::Config(format!(
                "Unknown preset '{}'. Available: {}",
                name,
                list_presets().join(", ")
            )))
        }
    };
    Ok(preset)
}

fn local_embedding(model: &str, dimension: usize, batch_size: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: EmbeddingProvider::Local,
        model: model.to_string(),
        dimension,
        batch_size,
        ..EmbeddingConfig::default()
    }
}

/// Context windows are given in tokens; the budget is kept in characters
/// with room left for the prompt scaffolding and the answer.
fn context_chars(context_tokens: usize) -> usize {
    context_tokens * 3
}

fn local_llm(model: &str, context_tokens: usize) -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::Local,
        model: model.to_string(),
        max_context_chars: context_chars(context_tokens),
        ..LlmConfig::default()
    }
}

fn remote_llm(model: &str, url: &str, api_key_env: &str, context_tokens: usize) -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::Remote,
        model: model.to_string(),
        url: url.to_string(),
        api_key_env: api_key_env.to_string(),
        // Keep prompts modest even when the remote window is huge
        max_context_chars: context_chars(context_tokens).min(24_000),
        ..LlmConfig::default()
    }
}
