mod common;

use common::Harness;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use zotero_rag::chunk::{chunk_pages, compute_content_hash};
use zotero_rag::config::ChunkConfig;
use zotero_rag::error::Error;
use zotero_rag::extract::split_pages;
use zotero_rag::index::{no_progress, CancellationToken, IndexRequest, ProgressCallback};
use zotero_rag::meta::RunStatus;
use zotero_rag::models::{
    IndexOutcome, IndexingMode, IndexingStatistics, LibraryIndexMetadata, LibraryType,
    RequestedMode,
};
use zotero_rag::store::{point_id_for, VectorStore};

const LIB: &str = "1";

const PDF_A: &str = "Photosynthesis turns light into sugar using chlorophyll.\x0cChlorophyll absorbs red and blue light.";
const PDF_B: &str = "A galaxy far away hosts a bright quasar.";
const PDF_D: &str = "Mitochondria run on enzyme cascades.";
const PDF_E: &str = "Volcano eruptions are driven by magma pressure.";

fn expected_chunks(content: &str) -> usize {
    chunk_pages(&split_pages(content), &ChunkConfig::default()).len()
}

/// Items A and B with PDFs, C without; returns the library version
fn seed_scenario(h: &Harness) -> i64 {
    h.zotero.add_library(LIB, "My Library", LibraryType::User);
    h.zotero.put_item(LIB, "A", "Light Harvesting");
    h.zotero.put_pdf(LIB, "A", "PA", PDF_A);
    h.zotero.put_item(LIB, "B", "Deep Sky Survey");
    h.zotero.put_pdf(LIB, "B", "PB", PDF_B);
    h.zotero.put_item(LIB, "C", "Citation Only");
    h.zotero.library_version(LIB)
}

async fn run(h: &Harness, mode: RequestedMode) -> IndexingStatistics {
    let request = IndexRequest::new(LIB, LibraryType::User, "My Library").with_mode(mode);
    h.engine
        .index_library(&request, no_progress(), &CancellationToken::new())
        .await
        .unwrap()
}

async fn metadata(h: &Harness) -> LibraryIndexMetadata {
    h.meta.get_metadata(LIB).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_full_index_counts_only_items_with_pdfs() {
    let h = Harness::new().await;
    let version = seed_scenario(&h);

    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.mode, Some(IndexingMode::Full));
    assert_eq!(stats.outcome, IndexOutcome::Completed);
    assert_eq!(stats.items_processed, 2);
    assert_eq!(stats.items_added, 2);
    assert_eq!(stats.errors, 0);

    let expected = expected_chunks(PDF_A) + expected_chunks(PDF_B);
    assert_eq!(stats.chunks_added as usize, expected);
    assert_eq!(h.chunk_count(LIB).await, expected);

    let meta = metadata(&h).await;
    assert_eq!(meta.last_indexed_version, version);
    assert_eq!(meta.total_items_indexed, 2);
    assert_eq!(meta.total_chunks as usize, expected);
    assert_eq!(meta.indexing_mode, IndexingMode::Full);
    assert_eq!(meta.library_name, "My Library");
}

#[tokio::test]
async fn test_chunks_carry_bibliographic_metadata_and_versions() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;

    let chunks = h.store.all_chunks().await;
    let a: Vec<_> = chunks.iter().filter(|c| c.item_key == "A").collect();
    assert_eq!(a.len(), expected_chunks(PDF_A));

    let first = a.iter().find(|c| c.page_number == Some(1)).unwrap();
    assert_eq!(first.title, "Light Harvesting");
    assert_eq!(first.authors, vec!["Rosalind Franklin".to_string()]);
    assert_eq!(first.year, Some(2020));
    assert_eq!(first.item_type.as_deref(), Some("journalArticle"));
    assert_eq!(first.attachment_key, "PA");
    assert_eq!(
        first.attachment_hash.as_deref(),
        Some(compute_content_hash(PDF_A.as_bytes()).as_str())
    );
    assert!(first.item_version.is_some());
    assert!(first.indexed_at.is_some());
    assert!(a.iter().any(|c| c.page_number == Some(2)));
}

#[tokio::test]
async fn test_full_reindex_is_idempotent() {
    let h = Harness::new().await;
    seed_scenario(&h);

    let first = run(&h, RequestedMode::Full).await;
    let count_after_first = h.chunk_count(LIB).await;
    let version_after_first = metadata(&h).await.last_indexed_version;

    let second = run(&h, RequestedMode::Full).await;
    assert_eq!(second.mode, Some(IndexingMode::Full));
    assert_eq!(second.items_processed, first.items_processed);
    assert_eq!(h.chunk_count(LIB).await, count_after_first);
    assert_eq!(metadata(&h).await.last_indexed_version, version_after_first);

    let mut ids: Vec<String> = h
        .store
        .all_chunks()
        .await
        .into_iter()
        .map(|c| c.chunk_id)
        .collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[tokio::test]
async fn test_incremental_indexes_exactly_new_items() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;
    let before = h.chunk_count(LIB).await;

    h.zotero.put_item(LIB, "D", "Cell Energy");
    h.zotero.put_pdf(LIB, "D", "PD", PDF_D);
    h.zotero.put_item(LIB, "E", "Hot Rocks");
    h.zotero.put_pdf(LIB, "E", "PE", PDF_E);
    let new_version = h.zotero.library_version(LIB);

    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.mode, Some(IndexingMode::Incremental));
    assert_eq!(stats.items_added, 2);
    assert_eq!(stats.items_updated, 0);
    assert_eq!(stats.items_processed, 2);
    assert_eq!(stats.last_version, new_version);
    assert_eq!(
        h.chunk_count(LIB).await,
        before + expected_chunks(PDF_D) + expected_chunks(PDF_E)
    );

    let meta = metadata(&h).await;
    assert_eq!(meta.last_indexed_version, new_version);
    assert_eq!(meta.total_items_indexed, 4);
    assert_eq!(meta.indexing_mode, IndexingMode::Incremental);
}

#[tokio::test]
async fn test_version_never_decreases() {
    let h = Harness::new().await;
    seed_scenario(&h);

    let mut versions = Vec::new();
    run(&h, RequestedMode::Auto).await;
    versions.push(metadata(&h).await.last_indexed_version);

    // Empty delta
    run(&h, RequestedMode::Incremental).await;
    versions.push(metadata(&h).await.last_indexed_version);

    h.zotero.put_item(LIB, "D", "Cell Energy");
    h.zotero.put_pdf(LIB, "D", "PD", PDF_D);
    run(&h, RequestedMode::Incremental).await;
    versions.push(metadata(&h).await.last_indexed_version);

    run(&h, RequestedMode::Full).await;
    versions.push(metadata(&h).await.last_indexed_version);

    assert!(versions.windows(2).all(|w| w[0] <= w[1]), "{versions:?}");
    assert_eq!(versions[0], versions[1]);
    assert!(versions[2] > versions[1]);
}

#[tokio::test]
async fn test_identical_pdfs_are_processed_once() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.put_item(LIB, "A2", "Light Harvesting (preprint)");
    h.zotero.put_pdf(LIB, "A2", "PA2", PDF_A);

    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(stats.items_processed, 3);
    assert_eq!(h.extractions(), 2);
    assert!(h.store.all_chunks().await.iter().all(|c| c.item_key != "A2"));

    let record = h
        .meta
        .check_duplicate(&compute_content_hash(PDF_A.as_bytes()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.item_key, "A");
    assert_eq!(record.attachment_key, "PA");
}

#[tokio::test]
async fn test_identical_pdfs_across_libraries() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.add_library("2", "Lab Group", LibraryType::Group);
    h.zotero.put_item("2", "G1", "Shared Paper");
    h.zotero.put_pdf("2", "G1", "GP1", PDF_B);

    run(&h, RequestedMode::Auto).await;
    let extractions = h.extractions();
    let embedded = h.embedder.texts_embedded.load(Ordering::SeqCst);

    let request = IndexRequest::new("2", LibraryType::Group, "Lab Group");
    let stats = h
        .engine
        .index_library(&request, no_progress(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(stats.items_processed, 1);
    assert_eq!(h.extractions(), extractions);
    assert_eq!(h.embedder.texts_embedded.load(Ordering::SeqCst), embedded);

    let record = h
        .meta
        .check_duplicate(&compute_content_hash(PDF_B.as_bytes()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.library_id, LIB);
    assert_eq!(record.item_key, "B");
}

#[tokio::test]
async fn test_stale_dedup_owner_is_taken_over() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.put_item(LIB, "A2", "Copy");
    h.zotero.put_pdf(LIB, "A2", "PA2", PDF_A);
    run(&h, RequestedMode::Auto).await;

    // The original owner disappears; the copy must not stay unindexed
    h.zotero.remove_item(LIB, "A");
    let stats = run(&h, RequestedMode::Full).await;

    assert_eq!(stats.duplicates_skipped, 0);
    assert!(h.store.all_chunks().await.iter().any(|c| c.item_key == "A2"));
    assert!(h.store.all_chunks().await.iter().all(|c| c.item_key != "A"));
}

#[tokio::test]
async fn test_copy_is_indexed_after_owner_replaces_its_pdf() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.put_item(LIB, "A2", "Copy");
    h.zotero.put_pdf(LIB, "A2", "PA2", PDF_A);
    run(&h, RequestedMode::Auto).await;

    // The owner now holds different content under the same attachment key
    h.zotero.put_pdf(LIB, "A", "PA", PDF_D);
    run(&h, RequestedMode::Incremental).await;
    let stats = run(&h, RequestedMode::Full).await;

    assert_eq!(stats.duplicates_skipped, 0);
    let chunks = h.store.all_chunks().await;
    assert!(chunks
        .iter()
        .any(|c| c.item_key == "A2" && c.text.contains("Photosynthesis")));
    assert!(chunks
        .iter()
        .filter(|c| c.item_key == "A")
        .all(|c| c.text.contains("Mitochondria")));

    let record = h
        .meta
        .check_duplicate(&compute_content_hash(PDF_A.as_bytes()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.item_key, "A2");
    assert_eq!(record.attachment_key, "PA2");
}

#[tokio::test]
async fn test_updated_item_replaces_its_chunks() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;

    let new_version = h.zotero.put_item(LIB, "A", "Light Harvesting, 2nd ed.");
    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.items_updated, 1);
    assert_eq!(stats.items_added, 0);
    assert_eq!(stats.chunks_deleted as usize, expected_chunks(PDF_A));
    assert_eq!(stats.chunks_added as usize, expected_chunks(PDF_A));

    let a: Vec<_> = h
        .store
        .all_chunks()
        .await
        .into_iter()
        .filter(|c| c.item_key == "A")
        .collect();
    assert_eq!(a.len(), expected_chunks(PDF_A));
    assert!(a.iter().all(|c| c.item_version == Some(new_version)));
    assert!(a.iter().all(|c| c.title == "Light Harvesting, 2nd ed."));
}

#[tokio::test]
async fn test_replaced_pdf_reindexes_parent() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;

    let replaced = "Chlorophyll revisited with new photosynthesis data.";
    let pdf_version = h.zotero.put_pdf(LIB, "A", "PA", replaced);
    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.items_updated, 1);
    assert_eq!(stats.last_version, pdf_version);
    let a: Vec<_> = h
        .store
        .all_chunks()
        .await
        .into_iter()
        .filter(|c| c.item_key == "A")
        .collect();
    assert_eq!(a.len(), expected_chunks(replaced));
    assert!(a.iter().all(|c| c.text.contains("revisited")));
}

#[tokio::test]
async fn test_legacy_chunks_without_version_are_reindexed() {
    let h = Harness::new().await;
    seed_scenario(&h);

    let mut meta = LibraryIndexMetadata::new(LIB, LibraryType::User, "My Library");
    meta.last_indexed_version = 0;
    h.meta.put_metadata(&meta).await.unwrap();

    let mut payload = serde_json::Map::new();
    payload.insert("chunk_id".into(), "1:A:PA:0".into());
    payload.insert("library_id".into(), LIB.into());
    payload.insert("item_key".into(), "A".into());
    payload.insert("attachment_key".into(), "PA".into());
    payload.insert("text".into(), "old photosynthesis text".into());
    payload.insert("title".into(), "Light Harvesting".into());
    h.store
        .insert_raw(
            point_id_for("1:A:PA:0"),
            common::KeywordEmbedder::vector("photosynthesis"),
            payload,
        )
        .await;

    assert_eq!(h.store.get_item_version(LIB, "A").await.unwrap(), Some(0));

    let stats = run(&h, RequestedMode::Incremental).await;
    assert_eq!(stats.items_updated, 1);
    assert_eq!(stats.items_added, 1);
    assert!(h
        .store
        .all_chunks()
        .await
        .iter()
        .filter(|c| c.item_key == "A")
        .all(|c| c.item_version.is_some()));
}

#[tokio::test]
async fn test_corrupt_attachment_is_counted_not_fatal() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.put_item(LIB, "X", "Damaged Scan");
    h.zotero.put_pdf(LIB, "X", "PX", "CORRUPT %PDF");

    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.outcome, IndexOutcome::Completed);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.items_processed, 2);
    assert!(h.store.all_chunks().await.iter().all(|c| c.item_key != "X"));
    assert!(h.meta.get_metadata(LIB).await.unwrap().is_some());
}

#[tokio::test]
async fn test_timed_out_download_is_counted_not_fatal() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.put_item(LIB, "S", "Slow Server");
    h.zotero.put_pdf(LIB, "S", "PS", PDF_E);
    h.zotero.set_download_stalled("PS");

    let stats = run(&h, RequestedMode::Auto).await;

    assert_eq!(stats.outcome, IndexOutcome::Completed);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.items_processed, 2);
    let chunks = h.store.all_chunks().await;
    assert!(chunks.iter().all(|c| c.item_key != "S"));
    assert!(chunks.iter().any(|c| c.item_key == "A"));
    assert!(chunks.iter().any(|c| c.item_key == "B"));
}

#[tokio::test]
async fn test_unreachable_content_store_fails_run() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.set_unavailable(true);

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    let err = h
        .engine
        .index_library(&request, no_progress(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ContentStoreUnavailable(_)));
    assert!(h.meta.get_metadata(LIB).await.unwrap().is_none());

    let latest = h.meta.list_runs(LIB, 1).await.unwrap().remove(0);
    assert_eq!(latest.get_status().unwrap(), RunStatus::Failed);
    assert!(latest.error_message.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_progress_reported_per_item() {
    let h = Harness::new().await;
    seed_scenario(&h);

    let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = calls.clone();
    let progress: ProgressCallback = Arc::new(move |current, total| {
        seen.lock().unwrap().push((current, total));
    });

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    h.engine
        .index_library(&request, progress, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![(0, 2), (1, 2), (2, 2)]);
}

#[tokio::test]
async fn test_cancellation_keeps_written_chunks() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;
    let version_before = metadata(&h).await.last_indexed_version;

    for key in ["D", "E", "F", "G"] {
        h.zotero.put_item(LIB, key, key);
        h.zotero
            .put_pdf(LIB, key, &format!("P{key}"), &format!("{key} enzyme notes"));
    }

    let token = CancellationToken::new();
    let cancel = token.clone();
    let progress: ProgressCallback = Arc::new(move |current, _| {
        if current == 2 {
            cancel.cancel();
        }
    });

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    let stats = h
        .engine
        .index_library(&request, progress, &token)
        .await
        .unwrap();

    assert_eq!(stats.outcome, IndexOutcome::Cancelled);
    assert_eq!(stats.items_processed, 2);

    let indexed: Vec<String> = h
        .store
        .all_chunks()
        .await
        .into_iter()
        .map(|c| c.item_key)
        .collect();
    assert!(indexed.contains(&"D".to_string()));
    assert!(indexed.contains(&"E".to_string()));
    assert!(!indexed.contains(&"F".to_string()));

    assert_eq!(metadata(&h).await.last_indexed_version, version_before);
    let latest = h.meta.list_runs(LIB, 1).await.unwrap().remove(0);
    assert_eq!(latest.get_status().unwrap(), RunStatus::Cancelled);

    // The next incremental run picks up where the cancelled one stopped
    let resumed = run(&h, RequestedMode::Incremental).await;
    assert_eq!(resumed.items_added, 2);
    assert_eq!(resumed.items_skipped, 2);
}

#[tokio::test]
async fn test_cancelled_first_run_leaves_no_metadata() {
    let h = Harness::new().await;
    seed_scenario(&h);

    let token = CancellationToken::new();
    token.cancel();
    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    let stats = h
        .engine
        .index_library(&request, no_progress(), &token)
        .await
        .unwrap();

    assert_eq!(stats.outcome, IndexOutcome::Cancelled);
    assert_eq!(stats.items_processed, 0);
    assert!(h.meta.get_metadata(LIB).await.unwrap().is_none());
}

#[tokio::test]
async fn test_hard_reset_rebuilds_library() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;
    let count = h.chunk_count(LIB).await;

    assert!(h.meta.set_force_reindex(LIB).await.unwrap());
    assert!(h.meta.set_force_reindex(LIB).await.unwrap());

    let stats = run(&h, RequestedMode::Incremental).await;

    assert_eq!(stats.mode, Some(IndexingMode::Full));
    assert_eq!(stats.chunks_deleted as usize, count);
    assert_eq!(stats.items_added, 2);
    assert_eq!(stats.duplicates_skipped, 0);
    assert_eq!(h.chunk_count(LIB).await, count);
    assert!(!metadata(&h).await.force_reindex);
}

#[tokio::test]
async fn test_reset_of_unknown_library_is_noop() {
    let h = Harness::new().await;
    assert!(!h.meta.set_force_reindex("404").await.unwrap());
    assert!(h.meta.get_metadata("404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_run_prunes_removed_items() {
    let h = Harness::new().await;
    seed_scenario(&h);
    run(&h, RequestedMode::Auto).await;

    h.zotero.remove_item(LIB, "B");

    // Incremental runs cannot see deletions
    run(&h, RequestedMode::Incremental).await;
    assert!(h.store.all_chunks().await.iter().any(|c| c.item_key == "B"));

    let stats = run(&h, RequestedMode::Full).await;
    assert!(h.store.all_chunks().await.iter().all(|c| c.item_key != "B"));
    assert!(stats.chunks_deleted as usize >= expected_chunks(PDF_B));
    assert!(h
        .meta
        .check_duplicate(&compute_content_hash(PDF_B.as_bytes()))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_max_items_limits_run_and_version() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.put_item(LIB, "D", "Cell Energy");
    h.zotero.put_pdf(LIB, "D", "PD", PDF_D);

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library").with_max_items(Some(1));
    let stats = h
        .engine
        .index_library(&request, no_progress(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.items_processed, 1);
    assert!(stats.last_version < h.zotero.library_version(LIB));

    // The rest arrives on the next incremental run
    let rest = run(&h, RequestedMode::Auto).await;
    assert_eq!(rest.mode, Some(IndexingMode::Incremental));
    assert_eq!(rest.items_added, 2);
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let h = Harness::new().await;
    seed_scenario(&h);
    h.zotero.set_download_delay_ms(50);

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    let first = h.ctx.jobs.start(request.clone()).await.unwrap();

    let second = h.ctx.jobs.start(request.clone()).await;
    assert!(matches!(
        second,
        Err(Error::ConcurrentIndexingConflict(ref id)) if id == LIB
    ));

    // The rejected caller can follow the running job instead
    let mut rx = h.ctx.jobs.subscribe(LIB).await.unwrap();
    assert!(rx.borrow_and_update().status.is_active());

    let stats = first.wait().await.unwrap();
    assert_eq!(stats.items_processed, 2);
    assert_eq!(h.chunk_count(LIB).await, expected_chunks(PDF_A) + expected_chunks(PDF_B));

    // Finished jobs free the slot
    let again = h.ctx.jobs.start(request).await.unwrap();
    tokio_test::assert_ok!(again.wait().await);
}

#[tokio::test]
async fn test_job_cancel_through_tracker() {
    let h = Harness::new().await;
    h.zotero.add_library(LIB, "My Library", LibraryType::User);
    for i in 0..6 {
        let key = format!("K{i}");
        h.zotero.put_item(LIB, &key, &key);
        h.zotero
            .put_pdf(LIB, &key, &format!("P{i}"), &format!("notes {i} on magma"));
    }
    h.zotero.set_download_delay_ms(100);

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    let handle = h.ctx.jobs.start(request).await.unwrap();
    let mut rx = handle.progress();

    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().current < 1 {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap();
    let reached = rx.borrow().current;

    assert!(h.ctx.jobs.cancel(LIB).await);
    let stats = handle.wait().await.unwrap();

    assert_eq!(stats.outcome, IndexOutcome::Cancelled);
    assert!(stats.items_processed < 6);
    assert!(stats.items_processed as usize >= reached);

    let snap = h.ctx.jobs.get_progress(LIB).await.unwrap();
    assert_eq!(snap.status, zotero_rag::jobs::JobStatus::Cancelled);
    assert!(!h.ctx.jobs.cancel(LIB).await);
}

#[tokio::test]
async fn test_panicking_job_is_marked_failed() {
    let h = Harness::new().await;
    h.zotero.add_library(LIB, "My Library", LibraryType::User);
    h.zotero.put_item(LIB, "P", "Crash Course");
    h.zotero.put_pdf(LIB, "P", "PP", "PANIC at the embedding stage");

    let request = IndexRequest::new(LIB, LibraryType::User, "My Library");
    let handle = h.ctx.jobs.start(request.clone()).await.unwrap();
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, Error::Other(_)));

    let snap = h.ctx.jobs.get_progress(LIB).await.unwrap();
    assert_eq!(snap.status, zotero_rag::jobs::JobStatus::Failed);
    assert!(snap.error.is_some());
    assert!(h.ctx.jobs.active_jobs().await.is_empty());

    // The slot is free again
    h.zotero.put_pdf(LIB, "P", "PP", PDF_E);
    let again = h.ctx.jobs.start(request).await.unwrap();
    tokio_test::assert_ok!(again.wait().await);
}
