//! Index command implementation

use crate::context::AppContext;
use crate::error::Result;
use crate::index::IndexRequest;
use crate::models::{IndexOutcome, IndexingStatistics, RequestedMode};
use crate::progress::{follow_job, library_progress_bar};
use tracing::{info, warn};

/// Options for the index command
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub mode: RequestedMode,
    /// Stop after this many items; falls back to `indexing.max_items`
    pub max_items: Option<usize>,
    /// Draw a progress bar
    pub show_progress: bool,
}

/// Index one library, following the job until it ends.
///
/// Ctrl-C requests cancellation; items already written stay indexed.
pub async fn cmd_index(
    ctx: &AppContext,
    library_id: &str,
    options: IndexOptions,
) -> Result<IndexingStatistics> {
    let library = ctx.resolve_library(library_id).await?;
    info!(
        library_id = %library.id,
        "Indexing {} library '{}'",
        library.library_type,
        library.name
    );

    let request = IndexRequest::new(&library.id, library.library_type, &library.name)
        .with_mode(options.mode)
        .with_max_items(options.max_items.or(ctx.config.indexing.max_items));

    let handle = ctx.jobs.start(request).await?;

    let follower = options.show_progress.then(|| {
        let bar = library_progress_bar(&library.name);
        tokio::spawn(follow_job(handle.progress(), bar))
    });

    let jobs = ctx.jobs.clone();
    let cancel_id = library.id.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the current item");
            jobs.cancel(&cancel_id).await;
        }
    });

    let result = handle.wait().await;
    interrupt.abort();
    if let Some(follower) = follower {
        let _ = follower.await;
    }

    result
}

pub fn print_index_stats(library_id: &str, stats: &IndexingStatistics) {
    let mode = stats
        .mode
        .map(|m| m.to_string())
        .unwrap_or_else(|| "-".to_string());

    match stats.outcome {
        IndexOutcome::Completed => println!("✓ Indexed library {} ({} mode)", library_id, mode),
        IndexOutcome::Cancelled => {
            println!("⚠ Indexing of library {} cancelled ({} mode)", library_id, mode)
        }
    }
    println!("  Items processed:    {}", stats.items_processed);
    println!("  Items added:        {}", stats.items_added);
    println!("  Items updated:      {}", stats.items_updated);
    println!("  Items unchanged:    {}", stats.items_skipped);
    println!("  Duplicate PDFs:     {}", stats.duplicates_skipped);
    println!("  Chunks added:       {}", stats.chunks_added);
    println!("  Chunks deleted:     {}", stats.chunks_deleted);
    println!("  Errors:             {}", stats.errors);
    println!("  Library version:    {}", stats.last_version);
    println!("  Elapsed:            {:.1}s", stats.elapsed_seconds);
}
