//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Library index metadata (last indexed version, counters, reset flag)
//! - Deduplication records (attachment content hash to first owner)
//! - Indexing runs (history and stats)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    DeduplicationRecord, IndexOutcome, IndexingMode, IndexingStatistics, LibraryIndexMetadata,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Indexing run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "cancelled" => Ok(RunStatus::Cancelled),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

impl From<IndexOutcome> for RunStatus {
    fn from(outcome: IndexOutcome) -> Self {
        match outcome {
            IndexOutcome::Completed => RunStatus::Completed,
            IndexOutcome::Cancelled => RunStatus::Cancelled,
        }
    }
}

/// Row shape of `library_index_metadata`
#[derive(Debug, Clone, FromRow)]
struct MetadataRow {
    library_id: String,
    library_type: String,
    library_name: String,
    last_indexed_version: i64,
    last_indexed_at: String,
    total_items_indexed: i64,
    total_chunks: i64,
    indexing_mode: String,
    force_reindex: bool,
    schema_version: i64,
}

impl TryFrom<MetadataRow> for LibraryIndexMetadata {
    type Error = Error;

    fn try_from(row: MetadataRow) -> Result<Self> {
        Ok(Self {
            library_type: row.library_type.parse()?,
            indexing_mode: row.indexing_mode.parse()?,
            library_id: row.library_id,
            library_name: row.library_name,
            last_indexed_version: row.last_indexed_version,
            last_indexed_at: row.last_indexed_at,
            total_items_indexed: row.total_items_indexed,
            total_chunks: row.total_chunks,
            force_reindex: row.force_reindex,
            schema_version: row.schema_version,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DedupRow {
    content_hash: String,
    library_id: String,
    item_key: String,
    attachment_key: String,
    relation_uri: Option<String>,
    created_at: String,
}

impl From<DedupRow> for DeduplicationRecord {
    fn from(row: DedupRow) -> Self {
        Self {
            content_hash: row.content_hash,
            library_id: row.library_id,
            item_key: row.item_key,
            attachment_key: row.attachment_key,
            relation_uri: row.relation_uri,
            created_at: row.created_at,
        }
    }
}

/// An indexing run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexingRun {
    pub id: String,
    pub library_id: String,
    pub mode: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub items_processed: i64,
    pub items_added: i64,
    pub items_updated: i64,
    pub chunks_added: i64,
    pub chunks_deleted: i64,
    pub errors: i64,
    pub last_version: i64,
    pub error_message: Option<String>,
}

impl IndexingRun {
    pub fn new(library_id: String, mode: IndexingMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            library_id,
            mode: mode.to_string(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            items_processed: 0,
            items_added: 0,
            items_updated: 0,
            chunks_added: 0,
            chunks_deleted: 0,
            errors: 0,
            last_version: 0,
            error_message: None,
        }
    }

    pub fn get_status(&self) -> Result<RunStatus> {
        self.status.parse()
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database at the configured path
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Open (and create if needed) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        // Auto-initialize schema if needed
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='library_index_metadata'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Library Index Metadata =====

    /// Get indexing metadata for a library
    pub async fn get_metadata(&self, library_id: &str) -> Result<Option<LibraryIndexMetadata>> {
        let row = sqlx::query_as::<_, MetadataRow>(
            "SELECT * FROM library_index_metadata WHERE library_id = ?",
        )
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LibraryIndexMetadata::try_from).transpose()
    }

    /// Insert or replace indexing metadata for a library
    pub async fn put_metadata(&self, meta: &LibraryIndexMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO library_index_metadata (
                library_id, library_type, library_name, last_indexed_version, last_indexed_at,
                total_items_indexed, total_chunks, indexing_mode, force_reindex, schema_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(library_id) DO UPDATE SET
                library_type = excluded.library_type,
                library_name = excluded.library_name,
                last_indexed_version = excluded.last_indexed_version,
                last_indexed_at = excluded.last_indexed_at,
                total_items_indexed = excluded.total_items_indexed,
                total_chunks = excluded.total_chunks,
                indexing_mode = excluded.indexing_mode,
                force_reindex = excluded.force_reindex,
                schema_version = excluded.schema_version
            "#,
        )
        .bind(&meta.library_id)
        .bind(meta.library_type.to_string())
        .bind(&meta.library_name)
        .bind(meta.last_indexed_version)
        .bind(&meta.last_indexed_at)
        .bind(meta.total_items_indexed)
        .bind(meta.total_chunks)
        .bind(meta.indexing_mode.to_string())
        .bind(meta.force_reindex)
        .bind(meta.schema_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List metadata for every indexed library
    pub async fn list_metadata(&self) -> Result<Vec<LibraryIndexMetadata>> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            "SELECT * FROM library_index_metadata ORDER BY library_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LibraryIndexMetadata::try_from).collect()
    }

    /// Request a hard reset on the next run.
    ///
    /// Returns false when the library has no metadata yet; its next run is
    /// full regardless.
    pub async fn set_force_reindex(&self, library_id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE library_index_metadata SET force_reindex = 1 WHERE library_id = ?")
                .bind(library_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // ===== Deduplication =====

    /// Look up the first owner of an attachment content hash
    pub async fn check_duplicate(&self, content_hash: &str) -> Result<Option<DeduplicationRecord>> {
        let row = sqlx::query_as::<_, DedupRow>("SELECT * FROM dedup_records WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(DeduplicationRecord::from))
    }

    /// Record (or take over) ownership of a content hash
    pub async fn put_dedup_record(&self, record: &DeduplicationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dedup_records (content_hash, library_id, item_key, attachment_key, relation_uri, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO UPDATE SET
                library_id = excluded.library_id,
                item_key = excluded.item_key,
                attachment_key = excluded.attachment_key,
                relation_uri = excluded.relation_uri,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.content_hash)
        .bind(&record.library_id)
        .bind(&record.item_key)
        .bind(&record.attachment_key)
        .bind(&record.relation_uri)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete every dedup record owned by a library
    pub async fn delete_library_dedup(&self, library_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dedup_records WHERE library_id = ?")
            .bind(library_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete dedup records owned by one item
    pub async fn delete_item_dedup(&self, library_id: &str, item_key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dedup_records WHERE library_id = ? AND item_key = ?")
            .bind(library_id)
            .bind(item_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ===== Indexing Run Operations =====

    /// Start a new indexing run
    pub async fn start_indexing_run(
        &self,
        library_id: &str,
        mode: IndexingMode,
    ) -> Result<IndexingRun> {
        let run = IndexingRun::new(library_id.to_string(), mode);
        sqlx::query(
            r#"
            INSERT INTO indexing_runs (id, library_id, mode, started_at, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.library_id)
        .bind(&run.mode)
        .bind(&run.started_at)
        .bind(&run.status)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete an indexing run with its final counters
    pub async fn complete_indexing_run(
        &self,
        id: &str,
        status: RunStatus,
        stats: &IndexingStatistics,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE indexing_runs SET
                completed_at = ?,
                status = ?,
                items_processed = ?,
                items_added = ?,
                items_updated = ?,
                chunks_added = ?,
                chunks_deleted = ?,
                errors = ?,
                last_version = ?,
                error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(stats.items_processed as i64)
        .bind(stats.items_added as i64)
        .bind(stats.items_updated as i64)
        .bind(stats.chunks_added as i64)
        .bind(stats.chunks_deleted as i64)
        .bind(stats.errors as i64)
        .bind(stats.last_version)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recent runs for a library, newest first
    pub async fn list_runs(&self, library_id: &str, limit: i64) -> Result<Vec<IndexingRun>> {
        let runs = sqlx::query_as::<_, IndexingRun>(
            "SELECT * FROM indexing_runs WHERE library_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(library_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}
