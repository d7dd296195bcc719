//! Domain types shared by the indexing and query engines.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of Zotero library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    User,
    Group,
}

impl LibraryType {
    /// Path segment used by the Zotero API (`users/{id}` or `groups/{id}`)
    pub fn api_segment(&self) -> &'static str {
        match self {
            LibraryType::User => "users",
            LibraryType::Group => "groups",
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryType::User => write!(f, "user"),
            LibraryType::Group => write!(f, "group"),
        }
    }
}

impl FromStr for LibraryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(LibraryType::User),
            "group" => Ok(LibraryType::Group),
            _ => Err(Error::InvalidRequest(format!("Unknown library type: {}", s))),
        }
    }
}

/// Mode an indexing run actually executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingMode {
    Full,
    Incremental,
}

impl fmt::Display for IndexingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexingMode::Full => write!(f, "full"),
            IndexingMode::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for IndexingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" => Ok(IndexingMode::Full),
            "incremental" => Ok(IndexingMode::Incremental),
            _ => Err(Error::InvalidRequest(format!("Unknown indexing mode: {}", s))),
        }
    }
}

/// Mode requested by the caller; `Auto` lets the engine decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedMode {
    #[default]
    Auto,
    Incremental,
    Full,
}

impl fmt::Display for RequestedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedMode::Auto => write!(f, "auto"),
            RequestedMode::Incremental => write!(f, "incremental"),
            RequestedMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for RequestedMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(RequestedMode::Auto),
            "incremental" => Ok(RequestedMode::Incremental),
            "full" => Ok(RequestedMode::Full),
            _ => Err(Error::InvalidRequest(format!("Unknown indexing mode: {}", s))),
        }
    }
}

/// Current schema version of [`LibraryIndexMetadata`]
pub const METADATA_SCHEMA_VERSION: i64 = 1;

/// Per-library indexing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryIndexMetadata {
    pub library_id: String,
    pub library_type: LibraryType,
    pub library_name: String,
    /// Highest Zotero version fully processed
    pub last_indexed_version: i64,
    pub last_indexed_at: String,
    pub total_items_indexed: i64,
    pub total_chunks: i64,
    pub indexing_mode: IndexingMode,
    /// Next run performs a hard reset
    pub force_reindex: bool,
    pub schema_version: i64,
}

impl LibraryIndexMetadata {
    pub fn new(library_id: &str, library_type: LibraryType, library_name: &str) -> Self {
        Self {
            library_id: library_id.to_string(),
            library_type,
            library_name: library_name.to_string(),
            last_indexed_version: 0,
            last_indexed_at: chrono::Utc::now().to_rfc3339(),
            total_items_indexed: 0,
            total_chunks: 0,
            indexing_mode: IndexingMode::Full,
            force_reindex: false,
            schema_version: METADATA_SCHEMA_VERSION,
        }
    }
}

/// A chunk of extracted attachment text, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub text: String,
    /// Hash of the normalized chunk text
    pub content_hash: String,
    pub library_id: String,
    pub item_key: String,
    pub attachment_key: String,
    /// 1-indexed page, when known
    pub page_number: Option<u32>,
    pub chunk_index: u32,
    /// First few words of the chunk, used as a citation anchor
    pub text_preview: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub item_type: Option<String>,
    pub publication: Option<String>,
    pub tags: Vec<String>,
    /// Hash of the whole source attachment this chunk came from
    pub attachment_hash: Option<String>,
    pub item_version: Option<i64>,
    pub attachment_version: Option<i64>,
    pub indexed_at: Option<String>,
}

impl DocumentChunk {
    /// Stable chunk id derived from its position in the library
    pub fn make_id(library_id: &str, item_key: &str, attachment_key: &str, index: u32) -> String {
        format!("{}:{}:{}:{}", library_id, item_key, attachment_key, index)
    }
}

/// First-seen owner of an attachment's content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationRecord {
    pub content_hash: String,
    pub library_id: String,
    pub item_key: String,
    pub attachment_key: String,
    /// Cross-library relation (e.g. `owl:sameAs`) when Zotero exposes one
    pub relation_uri: Option<String>,
    pub created_at: String,
}

impl DeduplicationRecord {
    pub fn is_owned_by(&self, library_id: &str, item_key: &str, attachment_key: &str) -> bool {
        self.library_id == library_id
            && self.item_key == item_key
            && self.attachment_key == attachment_key
    }
}

/// How a finished run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOutcome {
    #[default]
    Completed,
    Cancelled,
}

/// Counters reported at the end of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingStatistics {
    pub items_processed: u64,
    pub items_added: u64,
    pub items_updated: u64,
    pub items_skipped: u64,
    pub duplicates_skipped: u64,
    pub chunks_added: u64,
    pub chunks_deleted: u64,
    pub errors: u64,
    pub elapsed_seconds: f64,
    pub mode: Option<IndexingMode>,
    pub last_version: i64,
    pub outcome: IndexOutcome,
}

/// Rendering of a generated answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFormat {
    Plain,
    #[default]
    Markdown,
    Html,
}

impl fmt::Display for AnswerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerFormat::Plain => write!(f, "plain"),
            AnswerFormat::Markdown => write!(f, "markdown"),
            AnswerFormat::Html => write!(f, "html"),
        }
    }
}

impl FromStr for AnswerFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(AnswerFormat::Plain),
            "markdown" | "md" => Ok(AnswerFormat::Markdown),
            "html" => Ok(AnswerFormat::Html),
            _ => Err(Error::InvalidRequest(format!("Unknown answer format: {}", s))),
        }
    }
}

/// A citation pointing back into the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub item_id: String,
    pub library_id: String,
    pub title: String,
    pub page_number: Option<u32>,
    pub text_anchor: Option<String>,
    pub relevance_score: f32,
}

/// Answer to a question with its supporting sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub format: AnswerFormat,
    pub sources: Vec<SourceCitation>,
    /// False when nothing relevant was retrieved and no generation happened
    pub found: bool,
}
