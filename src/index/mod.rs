//! Library indexing
//!
//! Turns the content store's items into embedded, deduplicated chunks:
//! - Mode resolution (full vs. incremental) from stored metadata
//! - Version-delta planning with attachment-to-parent mapping
//! - Per-attachment extract, chunk, embed and batch write
//! - Cooperative cancellation and per-item progress

mod engine;

pub use engine::*;

use crate::models::{IndexingMode, LibraryIndexMetadata, LibraryType, RequestedMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called with `(items_done, items_total)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A progress callback that ignores updates
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_, _| {})
}

/// Cooperative cancellation flag shared between a job and its owner
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What to index and how
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub library_id: String,
    pub library_type: LibraryType,
    pub library_name: String,
    pub mode: RequestedMode,
    /// Stop after this many items with attachments
    pub max_items: Option<usize>,
}

impl IndexRequest {
    pub fn new(library_id: &str, library_type: LibraryType, library_name: &str) -> Self {
        Self {
            library_id: library_id.to_string(),
            library_type,
            library_name: library_name.to_string(),
            mode: RequestedMode::Auto,
            max_items: None,
        }
    }

    pub fn with_mode(mut self, mode: RequestedMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }
}

/// Decide the mode a run executes in.
///
/// No metadata or a pending reset always means full. Otherwise an explicit
/// request wins, and `Auto` picks incremental once a version has been recorded.
pub fn resolve_mode(
    existing: Option<&LibraryIndexMetadata>,
    requested: RequestedMode,
) -> IndexingMode {
    let Some(meta) = existing else {
        return IndexingMode::Full;
    };

    if meta.force_reindex {
        return IndexingMode::Full;
    }

    match requested {
        RequestedMode::Full => IndexingMode::Full,
        RequestedMode::Incremental => IndexingMode::Incremental,
        RequestedMode::Auto if meta.last_indexed_version > 0 => IndexingMode::Incremental,
        RequestedMode::Auto => IndexingMode::Full,
    }
}
