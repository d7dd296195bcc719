use super::{resolve_mode, CancellationToken, IndexRequest, ProgressCallback};
use crate::chunk::{chunk_pages, compute_content_hash, TextChunk};
use crate::config::ChunkConfig;
use crate::content::{ContentItem, ContentStore};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::extract::TextExtractor;
use crate::meta::{MetaDb, RunStatus};
use crate::models::{
    DeduplicationRecord, DocumentChunk, IndexOutcome, IndexingMode, IndexingStatistics,
    LibraryIndexMetadata,
};
use crate::store::{ChunkPoint, VectorStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// An item with at least one PDF attachment, ready to process
#[derive(Debug, Clone)]
struct WorkItem {
    item: ContentItem,
    attachments: Vec<ContentItem>,
    /// Max of the item's and its attachments' versions
    version: i64,
}

/// Result of planning a run
#[derive(Debug, Default)]
struct Plan {
    work: Vec<WorkItem>,
    /// Highest version among everything the content store returned
    max_listed_version: i64,
    /// Items whose attachments could not be listed
    failed_keys: HashSet<String>,
    errors: u64,
    truncated: bool,
}

/// Outcome of processing one attachment
enum AttachmentOutcome {
    Indexed(u64),
    Duplicate,
}

/// Counters for one item
#[derive(Debug, Default)]
struct ItemOutcome {
    chunks_added: u64,
    duplicates: u64,
    errors: u64,
}

/// Orchestrates delta detection, extraction, chunking, embedding and storage
pub struct IndexingEngine {
    content: Arc<dyn ContentStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    meta: MetaDb,
    chunk_config: ChunkConfig,
    batch_size: usize,
}

impl IndexingEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        meta: MetaDb,
        chunk_config: ChunkConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            content,
            extractor,
            embedder,
            store,
            meta,
            chunk_config,
            batch_size: batch_size.max(1),
        }
    }

    /// Index one library.
    ///
    /// Per-attachment failures are counted in the statistics. Connectivity
    /// failures of the content store or vector store end the run with an
    /// error. Cancellation is observed between items and yields
    /// `IndexOutcome::Cancelled` without advancing the library version.
    pub async fn index_library(
        &self,
        request: &IndexRequest,
        progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<IndexingStatistics> {
        let started = Instant::now();
        let existing = self.meta.get_metadata(&request.library_id).await?;
        let mode = resolve_mode(existing.as_ref(), request.mode);

        info!(
            library_id = %request.library_id,
            requested = %request.mode,
            mode = %mode,
            "Starting indexing"
        );

        let run = self
            .meta
            .start_indexing_run(&request.library_id, mode)
            .await?;

        match self
            .run(request, existing, mode, progress, cancel, started)
            .await
        {
            Ok(stats) => {
                self.meta
                    .complete_indexing_run(&run.id, RunStatus::from(stats.outcome), &stats, None)
                    .await?;
                info!(
                    library_id = %request.library_id,
                    processed = stats.items_processed,
                    added = stats.items_added,
                    updated = stats.items_updated,
                    chunks_added = stats.chunks_added,
                    chunks_deleted = stats.chunks_deleted,
                    errors = stats.errors,
                    "Indexing {:?} in {:.1}s",
                    stats.outcome,
                    stats.elapsed_seconds
                );
                Ok(stats)
            }
            Err(e) => {
                error!(library_id = %request.library_id, "Indexing failed: {}", e);
                let failed = IndexingStatistics {
                    mode: Some(mode),
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                    ..Default::default()
                };
                // Keep the original error even if recording the failure fails
                if let Err(record_err) = self
                    .meta
                    .complete_indexing_run(&run.id, RunStatus::Failed, &failed, Some(e.to_string()))
                    .await
                {
                    warn!("Could not record failed run: {}", record_err);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &IndexRequest,
        existing: Option<LibraryIndexMetadata>,
        mode: IndexingMode,
        progress: ProgressCallback,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<IndexingStatistics> {
        let library_id = request.library_id.as_str();
        let prior_version = existing
            .as_ref()
            .map(|m| m.last_indexed_version)
            .unwrap_or(0);
        let mut stats = IndexingStatistics {
            mode: Some(mode),
            last_version: prior_version,
            ..Default::default()
        };

        self.store.ensure_ready().await?;

        if existing.as_ref().is_some_and(|m| m.force_reindex) {
            info!(library_id = %library_id, "Hard reset: dropping chunks and dedup records");
            stats.chunks_deleted += self.store.delete_library_chunks(library_id).await?;
            self.meta.delete_library_dedup(library_id).await?;
        }

        let since = match mode {
            IndexingMode::Incremental => Some(prior_version),
            IndexingMode::Full => None,
        };
        let plan = self.plan(request, since).await?;
        stats.errors += plan.errors;

        // Prune first so stale dedup owners are gone before duplicates are checked
        if mode == IndexingMode::Full && !plan.truncated {
            stats.chunks_deleted += self.reconcile(library_id, &plan).await?;
        }

        let total = plan.work.len();
        info!(
            library_id = %library_id,
            "{} items with PDF attachments to process",
            total
        );
        progress(0, total);

        let mut max_processed_version = prior_version;
        let mut outcome = IndexOutcome::Completed;

        for (idx, work) in plan.work.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(library_id = %library_id, "Cancelled after {} of {} items", idx, total);
                outcome = IndexOutcome::Cancelled;
                break;
            }

            match self.index_work_item(request, mode, work, &mut stats).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        library_id = %library_id,
                        item_key = %work.item.key,
                        "Item failed: {}",
                        e
                    );
                    stats.errors += 1;
                }
            }
            max_processed_version = max_processed_version.max(work.version);
            progress(idx + 1, total);
        }

        stats.outcome = outcome;

        if outcome == IndexOutcome::Completed {
            // A truncated run only vouches for the items it reached
            let seen = if plan.truncated {
                max_processed_version
            } else {
                max_processed_version.max(plan.max_listed_version)
            };
            stats.last_version = prior_version.max(seen);
        }

        self.save_metadata(request, existing, mode, &stats).await?;
        stats.elapsed_seconds = started.elapsed().as_secs_f64();
        Ok(stats)
    }

    /// List the items to process and their PDF attachments
    async fn plan(&self, request: &IndexRequest, since: Option<i64>) -> Result<Plan> {
        let library_id = request.library_id.as_str();
        let library_type = request.library_type;
        let listed = self
            .content
            .list_items(library_id, library_type, since)
            .await?;

        let mut plan = Plan {
            max_listed_version: listed.iter().map(|i| i.version).max().unwrap_or(0),
            ..Default::default()
        };

        let mut order: Vec<String> = Vec::new();
        let mut items: HashMap<String, ContentItem> = HashMap::new();
        let mut orphan_parents: Vec<String> = Vec::new();

        for item in listed {
            if item.is_regular() {
                if !items.contains_key(&item.key) {
                    order.push(item.key.clone());
                    items.insert(item.key.clone(), item);
                }
            } else if item.is_pdf_attachment() {
                // A replaced PDF should re-index its parent
                if let Some(parent) = item.parent_item {
                    orphan_parents.push(parent);
                }
            }
        }

        for parent_key in orphan_parents {
            if items.contains_key(&parent_key) {
                continue;
            }
            match self
                .content
                .get_item(library_id, library_type, &parent_key)
                .await
            {
                Ok(Some(parent)) if parent.is_regular() => {
                    debug!(item_key = %parent_key, "Adding parent of changed attachment");
                    order.push(parent_key.clone());
                    items.insert(parent_key, parent);
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(item_key = %parent_key, "Could not fetch parent item: {}", e);
                    plan.errors += 1;
                    plan.failed_keys.insert(parent_key);
                }
            }
        }

        for key in order {
            let Some(item) = items.remove(&key) else {
                continue;
            };

            let children = match self.content.children(library_id, library_type, &key).await {
                Ok(children) => children,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(item_key = %key, "Could not list attachments: {}", e);
                    plan.errors += 1;
                    plan.failed_keys.insert(key);
                    continue;
                }
            };

            let attachments: Vec<ContentItem> = children
                .into_iter()
                .filter(ContentItem::is_pdf_attachment)
                .collect();
            if attachments.is_empty() {
                continue;
            }

            let version = attachments
                .iter()
                .map(|a| a.version)
                .fold(item.version, i64::max);
            plan.work.push(WorkItem {
                item,
                attachments,
                version,
            });
        }

        if let Some(max) = request.max_items.filter(|m| *m > 0) {
            if plan.work.len() > max {
                info!("Limiting run to {} of {} items", max, plan.work.len());
                plan.work.truncate(max);
                plan.truncated = true;
            }
        }

        Ok(plan)
    }

    async fn index_work_item(
        &self,
        request: &IndexRequest,
        mode: IndexingMode,
        work: &WorkItem,
        stats: &mut IndexingStatistics,
    ) -> Result<()> {
        let library_id = request.library_id.as_str();
        let item_key = work.item.key.as_str();

        let updated = match mode {
            IndexingMode::Full => {
                stats.chunks_deleted += self.store.delete_item_chunks(library_id, item_key).await?;
                false
            }
            IndexingMode::Incremental => {
                match self.store.get_item_version(library_id, item_key).await? {
                    None => false,
                    Some(stored) if stored < work.version => {
                        debug!(
                            item_key = %item_key,
                            "Updating item ({} -> {})",
                            stored,
                            work.version
                        );
                        stats.chunks_deleted +=
                            self.store.delete_item_chunks(library_id, item_key).await?;
                        true
                    }
                    Some(stored) => {
                        debug!(item_key = %item_key, "Already current at version {}", stored);
                        stats.items_skipped += 1;
                        stats.items_processed += 1;
                        return Ok(());
                    }
                }
            }
        };

        let outcome = self.process_item(request, work).await?;
        stats.chunks_added += outcome.chunks_added;
        stats.duplicates_skipped += outcome.duplicates;

        if outcome.errors > 0 {
            // Failed attachments are already logged; count them individually
            stats.errors += outcome.errors - 1;
            return Err(Error::AttachmentProcessing {
                attachment_key: item_key.to_string(),
                message: format!("{} attachment(s) failed", outcome.errors),
            });
        }

        stats.items_processed += 1;
        if updated {
            stats.items_updated += 1;
        } else {
            stats.items_added += 1;
        }
        Ok(())
    }

    async fn process_item(&self, request: &IndexRequest, work: &WorkItem) -> Result<ItemOutcome> {
        let mut outcome = ItemOutcome::default();

        for attachment in &work.attachments {
            match self.process_attachment(request, work, attachment).await {
                Ok(AttachmentOutcome::Indexed(n)) => outcome.chunks_added += n,
                Ok(AttachmentOutcome::Duplicate) => outcome.duplicates += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        library_id = %request.library_id,
                        item_key = %work.item.key,
                        attachment_key = %attachment.key,
                        "Attachment failed: {}",
                        e
                    );
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn process_attachment(
        &self,
        request: &IndexRequest,
        work: &WorkItem,
        attachment: &ContentItem,
    ) -> Result<AttachmentOutcome> {
        let library_id = request.library_id.as_str();
        let item_key = work.item.key.as_str();
        let attachment_key = attachment.key.as_str();
        let wrap = |e: Error| -> Error {
            if e.is_fatal() {
                e
            } else {
                Error::AttachmentProcessing {
                    attachment_key: attachment_key.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let bytes = self
            .content
            .download(library_id, request.library_type, attachment_key)
            .await
            .map_err(wrap)?;
        let attachment_hash = compute_content_hash(&bytes);

        if let Some(record) = self.meta.check_duplicate(&attachment_hash).await? {
            if !record.is_owned_by(library_id, item_key, attachment_key) {
                // The owner may have replaced its PDF since; only live chunks count
                let indexed = self.store.count_hash_chunks(&attachment_hash).await?;
                if indexed > 0 {
                    info!(
                        attachment_key = %attachment_key,
                        owner = %format!("{}:{}", record.library_id, record.item_key),
                        "Skipping duplicate PDF ({})",
                        &attachment_hash[..8.min(attachment_hash.len())]
                    );
                    return Ok(AttachmentOutcome::Duplicate);
                }
                debug!(attachment_key = %attachment_key, "Taking over stale dedup record");
            }
        }

        let pages = self.extractor.extract(bytes).await.map_err(wrap)?;

        let config = self.chunk_config.clone();
        let chunks: Vec<TextChunk> =
            tokio::task::spawn_blocking(move || chunk_pages(&pages, &config))
                .await
                .map_err(|e| Error::Other(format!("Chunking task failed: {}", e)))?;
        if chunks.is_empty() {
            return Err(wrap(Error::Extraction("No text chunks produced".to_string())));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size)
            .await
            .map_err(wrap)?;

        let indexed_at = Utc::now().to_rfc3339();
        let item = &work.item;
        let authors = item.authors();
        let year = item.year();
        let title = if item.title.trim().is_empty() {
            "Untitled".to_string()
        } else {
            item.title.clone()
        };

        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let doc = DocumentChunk {
                    chunk_id: DocumentChunk::make_id(library_id, item_key, attachment_key, chunk.index),
                    text: chunk.text,
                    content_hash: chunk.hash,
                    library_id: library_id.to_string(),
                    item_key: item_key.to_string(),
                    attachment_key: attachment_key.to_string(),
                    page_number: chunk.page_number,
                    chunk_index: chunk.index,
                    text_preview: chunk.preview,
                    title: title.clone(),
                    authors: authors.clone(),
                    year,
                    item_type: Some(item.item_type.clone()),
                    publication: item.publication.clone(),
                    tags: item.tags.clone(),
                    attachment_hash: Some(attachment_hash.clone()),
                    item_version: Some(work.version),
                    attachment_version: Some(attachment.version),
                    indexed_at: Some(indexed_at.clone()),
                };
                ChunkPoint::new(&doc, vector)
            })
            .collect();

        let count = points.len() as u64;
        self.store.upsert_chunks(points).await?;

        self.meta
            .put_dedup_record(&DeduplicationRecord {
                content_hash: attachment_hash,
                library_id: library_id.to_string(),
                item_key: item_key.to_string(),
                attachment_key: attachment_key.to_string(),
                relation_uri: item.same_as.clone(),
                created_at: indexed_at,
            })
            .await?;

        debug!(
            item_key = %item_key,
            attachment_key = %attachment_key,
            "Stored {} chunks",
            count
        );
        Ok(AttachmentOutcome::Indexed(count))
    }

    /// Drop chunks of items the content store no longer lists with PDFs
    async fn reconcile(&self, library_id: &str, plan: &Plan) -> Result<u64> {
        let current: HashSet<&str> = plan.work.iter().map(|w| w.item.key.as_str()).collect();
        let stored = self.store.list_item_keys(library_id).await?;

        let mut deleted = 0;
        for key in stored {
            if current.contains(key.as_str()) || plan.failed_keys.contains(&key) {
                continue;
            }
            debug!(item_key = %key, "Pruning chunks of removed item");
            deleted += self.store.delete_item_chunks(library_id, &key).await?;
            self.meta.delete_item_dedup(library_id, &key).await?;
        }

        if deleted > 0 {
            info!(library_id = %library_id, "Pruned {} stale chunks", deleted);
        }
        Ok(deleted)
    }

    async fn save_metadata(
        &self,
        request: &IndexRequest,
        existing: Option<LibraryIndexMetadata>,
        mode: IndexingMode,
        stats: &IndexingStatistics,
    ) -> Result<()> {
        let completed = stats.outcome == IndexOutcome::Completed;

        // A cancelled first run leaves no metadata, so the next run is full again
        let mut meta = match existing {
            Some(meta) => meta,
            None if completed => LibraryIndexMetadata::new(
                &request.library_id,
                request.library_type,
                &request.library_name,
            ),
            None => return Ok(()),
        };

        meta.library_type = request.library_type;
        if !request.library_name.is_empty() {
            meta.library_name = request.library_name.clone();
        }
        meta.total_chunks = self.store.count_library_chunks(&request.library_id).await? as i64;
        meta.last_indexed_at = Utc::now().to_rfc3339();

        if completed {
            meta.last_indexed_version = meta.last_indexed_version.max(stats.last_version);
            meta.total_items_indexed = match mode {
                IndexingMode::Full => stats.items_processed as i64,
                IndexingMode::Incremental => meta.total_items_indexed + stats.items_added as i64,
            };
            meta.indexing_mode = mode;
            meta.force_reindex = false;
        }

        self.meta.put_metadata(&meta).await
    }
}
