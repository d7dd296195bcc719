//! Configuration management for zotero-rag
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;
mod presets;

pub use defaults::*;
pub use presets::*;

use crate::error::{Error, Result};
use crate::models::AnswerFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Zotero local API URL
    #[serde(default = "default_zotero_url")]
    pub zotero_url: String,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection holding document chunks
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Preset the config was created from (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub chunk: ChunkConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Where embeddings are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Local,
    Remote,
}

/// Where answers are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Local,
    Remote,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// OpenAI-compatible base URL (ending in /v1)
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Environment variable holding the API key (remote only)
    #[serde(default)]
    pub api_key_env: String,

    /// Cache embeddings by content hash
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProvider,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// OpenAI-compatible base URL (ending in /v1)
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Environment variable holding the API key (remote only)
    #[serde(default)]
    pub api_key_env: String,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Character budget for retrieved context in a prompt
    #[serde(default = "default_llm_max_context_chars")]
    pub max_context_chars: usize,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap characters between chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,

    /// Words kept in the citation preview
    #[serde(default = "default_preview_words")]
    pub preview_words: usize,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_query_max_top_k")]
    pub max_top_k: usize,

    /// Minimum similarity score (0.0 - 1.0)
    #[serde(default = "default_query_min_score")]
    pub min_score: f32,

    #[serde(default = "default_answer_format")]
    pub answer_format: AnswerFormat,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Per network call timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Stop after this many items (testing aid)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for zotero-rag data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zotero_url: default_zotero_url(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            preset: None,
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            chunk: ChunkConfig::default(),
            query: QueryConfig::default(),
            indexing: IndexingConfig::default(),
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            url: default_embedding_url(),
            api_key_env: String::new(),
            cache_enabled: default_cache_enabled(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: default_llm_url(),
            api_key_env: String::new(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            max_context_chars: default_llm_max_context_chars(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
            preview_words: default_preview_words(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_query_top_k(),
            max_top_k: default_query_max_top_k(),
            min_score: default_query_min_score(),
            answer_format: default_answer_format(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_items: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

/// Read an API key from the named environment variable
pub fn api_key_from_env(var: &str) -> Option<String> {
    if var.is_empty() {
        return None;
    }
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Get the default base directory for zotero-rag (~/.zotero-rag)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zotero-rag")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Build a config from a named preset
    pub fn from_preset(name: &str) -> Result<Self> {
        let mut config = Config::default();
        config.apply_preset(name)?;
        Ok(config)
    }

    /// Overwrite the embedding, generation and retrieval sections with a preset
    pub fn apply_preset(&mut self, name: &str) -> Result<()> {
        let preset = get_preset(name)?;
        debug!("Applying preset {}: {}", preset.name, preset.description);
        self.embedding = preset.embedding;
        self.llm = preset.llm;
        self.query.default_top_k = preset.top_k;
        self.query.min_score = preset.min_score;
        self.chunk.max_chars = preset.chunk_max_chars;
        self.preset = Some(preset.name.to_string());
        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        api_key_from_env(&self.qdrant_api_key_env)
    }

    /// Check if zotero-rag is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.max_chars == 0 {
            return Err(Error::Config("chunk.max_chars must be positive".to_string()));
        }

        if self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be < chunk.max_chars".to_string(),
            ));
        }

        if self.chunk.preview_words == 0 {
            return Err(Error::Config(
                "chunk.preview_words must be positive".to_string(),
            ));
        }

        if self.embedding.dimension == 0 || self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.dimension and embedding.batch_size must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.query.min_score) {
            return Err(Error::Config(
                "query.min_score must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.query.default_top_k == 0 || self.query.default_top_k > self.query.max_top_k {
            return Err(Error::Config(
                "query.default_top_k must be between 1 and query.max_top_k".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.indexing.request_timeout_secs == 0 {
            return Err(Error::Config(
                "indexing.request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
