//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Per-library indexing state
CREATE TABLE IF NOT EXISTS library_index_metadata (
    library_id TEXT PRIMARY KEY,
    library_type TEXT NOT NULL,
    library_name TEXT NOT NULL,
    last_indexed_version INTEGER NOT NULL DEFAULT 0,
    last_indexed_at TEXT NOT NULL,
    total_items_indexed INTEGER NOT NULL DEFAULT 0,
    total_chunks INTEGER NOT NULL DEFAULT 0,
    indexing_mode TEXT NOT NULL,
    force_reindex INTEGER NOT NULL DEFAULT 0,
    schema_version INTEGER NOT NULL DEFAULT 1
);

-- First-seen owner of each attachment content hash
CREATE TABLE IF NOT EXISTS dedup_records (
    content_hash TEXT PRIMARY KEY,
    library_id TEXT NOT NULL,
    item_key TEXT NOT NULL,
    attachment_key TEXT NOT NULL,
    relation_uri TEXT,
    created_at TEXT NOT NULL
);

-- Indexing runs: tracking history
CREATE TABLE IF NOT EXISTS indexing_runs (
    id TEXT PRIMARY KEY,
    library_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    items_processed INTEGER DEFAULT 0,
    items_added INTEGER DEFAULT 0,
    items_updated INTEGER DEFAULT 0,
    chunks_added INTEGER DEFAULT 0,
    chunks_deleted INTEGER DEFAULT 0,
    errors INTEGER DEFAULT 0,
    last_version INTEGER DEFAULT 0,
    error_message TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_dedup_library ON dedup_records(library_id);
CREATE INDEX IF NOT EXISTS idx_dedup_owner ON dedup_records(library_id, item_key, attachment_key);
CREATE INDEX IF NOT EXISTS idx_runs_library ON indexing_runs(library_id);
"#;
