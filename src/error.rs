//! Custom error types for zotero-rag

use thiserror::Error;

/// Main error type for zotero-rag operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Content store unavailable: {0}")]
    ContentStoreUnavailable(String),

    #[error("Content store error: {0}")]
    ContentStore(String),

    #[error("Attachment {attachment_key} failed: {message}")]
    AttachmentProcessing {
        attachment_key: String,
        message: String,
    },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Library {0} is already being indexed")]
    ConcurrentIndexingConflict(String),

    #[error("Library {0} has not been indexed")]
    LibraryNotIndexed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'zotero-rag init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error ends the whole operation rather than a single item.
    ///
    /// Per-attachment failures (bad PDF, embedding hiccup, download timeout)
    /// are absorbed by the indexing loop; these are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ContentStoreUnavailable(_)
                | Error::VectorStore(_)
                | Error::Database(_)
                | Error::Config(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for zotero-rag
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::VectorStore(err.to_string())
    }
}
