//! Status command implementation

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::jobs::ProgressSnapshot;
use crate::meta::IndexingRun;
use crate::models::LibraryIndexMetadata;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Runs shown per library
pub const RECENT_RUNS: i64 = 5;

/// Index state of one library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStatus {
    pub metadata: LibraryIndexMetadata,
    /// Chunks currently in the vector store, when it is reachable
    pub chunk_count: Option<u64>,
    /// Newest first
    pub recent_runs: Vec<IndexingRun>,
    /// Running job in this process, if any
    pub job: Option<ProgressSnapshot>,
}

/// Overall status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub zotero_url: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub llm_model: String,
    pub zotero_connected: bool,
    pub qdrant_connected: bool,
    pub libraries: Vec<LibraryStatus>,
    /// Jobs running in this process, including first runs with no metadata yet
    pub active_jobs: Vec<ProgressSnapshot>,
}

/// Index state of one library, or `LibraryNotIndexed`
pub async fn cmd_library_status(ctx: &AppContext, library_id: &str) -> Result<LibraryStatus> {
    let metadata = ctx
        .meta
        .get_metadata(library_id)
        .await?
        .ok_or_else(|| Error::LibraryNotIndexed(library_id.to_string()))?;

    let chunk_count = match ctx.store.count_library_chunks(library_id).await {
        Ok(count) => Some(count),
        Err(e) => {
            debug!("Vector store count failed: {}", e);
            None
        }
    };

    Ok(LibraryStatus {
        metadata,
        chunk_count,
        recent_runs: ctx.meta.list_runs(library_id, RECENT_RUNS).await?,
        job: ctx.jobs.get_progress(library_id).await,
    })
}

/// Status of the configured services and every indexed library
pub async fn cmd_status(ctx: &AppContext) -> Result<StatusInfo> {
    info!("Getting status");

    let zotero_connected = match ctx.content.list_libraries().await {
        Ok(_) => true,
        Err(e) => {
            debug!("Zotero connection error: {}", e);
            false
        }
    };

    let mut libraries = Vec::new();
    for meta in ctx.meta.list_metadata().await? {
        libraries.push(cmd_library_status(ctx, &meta.library_id).await?);
    }

    let qdrant_connected = if libraries.is_empty() {
        ctx.store.ensure_ready().await.is_ok()
    } else {
        libraries.iter().all(|l| l.chunk_count.is_some())
    };

    let config = &ctx.config;
    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        zotero_url: config.zotero_url.clone(),
        qdrant_url: config.qdrant_url.clone(),
        collection_name: config.collection_name.clone(),
        embedding_model: config.embedding.model.clone(),
        llm_model: config.llm.model.clone(),
        zotero_connected,
        qdrant_connected,
        libraries,
        active_jobs: ctx.jobs.active_jobs().await,
    })
}

pub fn print_library_status(status: &LibraryStatus) {
    let meta = &status.metadata;
    println!("Library {} ({}, {})", meta.library_id, meta.library_name, meta.library_type);
    println!("  Last version:   {}", meta.last_indexed_version);
    println!("  Last indexed:   {}", meta.last_indexed_at);
    println!("  Mode:           {}", meta.indexing_mode);
    println!("  Items indexed:  {}", meta.total_items_indexed);
    match status.chunk_count {
        Some(count) => println!("  Chunks:         {}", count),
        None => println!("  Chunks:         {} (vector store unreachable)", meta.total_chunks),
    }
    if meta.force_reindex {
        println!("  Reset pending:  next run rebuilds the index");
    }
    for (i, run) in status.recent_runs.iter().enumerate() {
        let label = if i == 0 { "Runs:" } else { "" };
        println!(
            "  {:<15} {} {} {} ({} added, {} updated, {} errors)",
            label, run.started_at, run.mode, run.status, run.items_added, run.items_updated, run.errors
        );
    }
    if let Some(job) = &status.job {
        println!(
            "  Job:            {} {}/{} ({:.0}%)",
            job.status, job.current, job.total, job.percent
        );
    }
}

pub fn print_status(status: &StatusInfo) {
    let mark = |ok: bool| if ok { "✓" } else { "✗" };

    println!("zotero-rag status\n");
    println!("Config:      {}", status.config_path);
    println!("Database:    {}", status.db_path);
    println!("Zotero:      {} {}", mark(status.zotero_connected), status.zotero_url);
    println!(
        "Qdrant:      {} {} ({})",
        mark(status.qdrant_connected),
        status.qdrant_url,
        status.collection_name
    );
    println!("Embeddings:  {}", status.embedding_model);
    println!("LLM:         {}", status.llm_model);
    println!();

    for job in &status.active_jobs {
        println!(
            "Indexing {}: {} {}/{} ({:.0}%)",
            job.library_id, job.status, job.current, job.total, job.percent
        );
    }
    if !status.active_jobs.is_empty() {
        println!();
    }

    if status.libraries.is_empty() {
        println!("No libraries indexed yet. Run 'zotero-rag index <library-id>'.");
        return;
    }

    for library in &status.libraries {
        print_library_status(library);
    }
}
