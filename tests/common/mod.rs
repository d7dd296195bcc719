//! In-process fakes for the engines' collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zotero_rag::config::{ChunkConfig, Config, LlmConfig, QueryConfig};
use zotero_rag::content::{ContentItem, ContentStore, Creator, LibraryInfo, PDF_CONTENT_TYPE};
use zotero_rag::context::AppContext;
use zotero_rag::embed::Embedder;
use zotero_rag::error::{Error, Result};
use zotero_rag::extract::{split_pages, PageText, TextExtractor};
use zotero_rag::index::IndexingEngine;
use zotero_rag::llm::Generator;
use zotero_rag::meta::MetaDb;
use zotero_rag::models::LibraryType;
use zotero_rag::rag::QueryEngine;
use zotero_rag::store::MemoryStore;

// ============ Content store ============

#[derive(Default)]
struct FakeLibrary {
    name: String,
    library_type: Option<LibraryType>,
    version: i64,
    items: Vec<ContentItem>,
    files: HashMap<String, Vec<u8>>,
}

/// Zotero stand-in with a library-wide version counter
#[derive(Default)]
pub struct FakeZotero {
    libraries: Mutex<HashMap<String, FakeLibrary>>,
    unavailable: AtomicBool,
    download_delay_ms: AtomicUsize,
    stalled: Mutex<HashSet<String>>,
    pub downloads: AtomicUsize,
}

impl FakeZotero {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_library(&self, id: &str, name: &str, library_type: LibraryType) {
        let mut libs = self.libraries.lock().unwrap();
        libs.entry(id.to_string()).or_default().name = name.to_string();
        libs.entry(id.to_string()).or_default().library_type = Some(library_type);
    }

    /// Add or modify a regular item, returning its new version
    pub fn put_item(&self, lib: &str, key: &str, title: &str) -> i64 {
        let mut libs = self.libraries.lock().unwrap();
        let library = libs.entry(lib.to_string()).or_default();
        library.version += 1;
        let version = library.version;
        library.items.retain(|i| i.key != key);
        library.items.push(ContentItem {
            key: key.to_string(),
            version,
            item_type: "journalArticle".to_string(),
            title: title.to_string(),
            creators: vec![Creator {
                creator_type: "author".to_string(),
                first_name: Some("Rosalind".to_string()),
                last_name: Some("Franklin".to_string()),
                name: None,
            }],
            date: Some("2020-03-01".to_string()),
            tags: vec!["science".to_string()],
            ..Default::default()
        });
        version
    }

    /// Add or replace a PDF attachment, returning its new version
    pub fn put_pdf(&self, lib: &str, parent: &str, key: &str, content: &str) -> i64 {
        let mut libs = self.libraries.lock().unwrap();
        let library = libs.entry(lib.to_string()).or_default();
        library.version += 1;
        let version = library.version;
        library.items.retain(|i| i.key != key);
        library.items.push(ContentItem {
            key: key.to_string(),
            version,
            item_type: "attachment".to_string(),
            title: format!("{}.pdf", key),
            parent_item: Some(parent.to_string()),
            content_type: Some(PDF_CONTENT_TYPE.to_string()),
            ..Default::default()
        });
        library
            .files
            .insert(key.to_string(), content.as_bytes().to_vec());
        version
    }

    /// Add a standalone note child
    pub fn put_note(&self, lib: &str, parent: &str, key: &str) {
        let mut libs = self.libraries.lock().unwrap();
        let library = libs.entry(lib.to_string()).or_default();
        library.version += 1;
        library.items.push(ContentItem {
            key: key.to_string(),
            version: library.version,
            item_type: "note".to_string(),
            parent_item: Some(parent.to_string()),
            ..Default::default()
        });
    }

    pub fn remove_item(&self, lib: &str, key: &str) {
        let mut libs = self.libraries.lock().unwrap();
        if let Some(library) = libs.get_mut(lib) {
            library.version += 1;
            library
                .items
                .retain(|i| i.key != key && i.parent_item.as_deref() != Some(key));
        }
    }

    pub fn library_version(&self, lib: &str) -> i64 {
        self.libraries
            .lock()
            .unwrap()
            .get(lib)
            .map(|l| l.version)
            .unwrap_or(0)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Slow every download down so cancellation can land mid-run
    pub fn set_download_delay_ms(&self, ms: usize) {
        self.download_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Make one attachment's download hit the client timeout
    pub fn set_download_stalled(&self, attachment_key: &str) {
        self.stalled
            .lock()
            .unwrap()
            .insert(attachment_key.to_string());
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::ContentStoreUnavailable(
                "connection refused".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentStore for FakeZotero {
    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>> {
        self.check_available()?;
        let libs = self.libraries.lock().unwrap();
        let mut out: Vec<LibraryInfo> = libs
            .iter()
            .map(|(id, lib)| LibraryInfo {
                id: id.clone(),
                name: lib.name.clone(),
                library_type: lib.library_type.unwrap_or(LibraryType::User),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn list_items(
        &self,
        library_id: &str,
        _library_type: LibraryType,
        since: Option<i64>,
    ) -> Result<Vec<ContentItem>> {
        self.check_available()?;
        let libs = self.libraries.lock().unwrap();
        let since = since.unwrap_or(0);
        Ok(libs
            .get(library_id)
            .map(|l| {
                l.items
                    .iter()
                    .filter(|i| i.version > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_item(
        &self,
        library_id: &str,
        _library_type: LibraryType,
        item_key: &str,
    ) -> Result<Option<ContentItem>> {
        self.check_available()?;
        let libs = self.libraries.lock().unwrap();
        Ok(libs
            .get(library_id)
            .and_then(|l| l.items.iter().find(|i| i.key == item_key).cloned()))
    }

    async fn children(
        &self,
        library_id: &str,
        _library_type: LibraryType,
        item_key: &str,
    ) -> Result<Vec<ContentItem>> {
        self.check_available()?;
        let libs = self.libraries.lock().unwrap();
        Ok(libs
            .get(library_id)
            .map(|l| {
                l.items
                    .iter()
                    .filter(|i| i.parent_item.as_deref() == Some(item_key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download(
        &self,
        library_id: &str,
        _library_type: LibraryType,
        attachment_key: &str,
    ) -> Result<Vec<u8>> {
        self.check_available()?;
        let delay = self.download_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay as u64)).await;
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.stalled.lock().unwrap().contains(attachment_key) {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            return Err(Error::ContentStore(format!(
                "Request to Zotero timed out: items/{}/file",
                attachment_key
            )));
        }
        let libs = self.libraries.lock().unwrap();
        libs.get(library_id)
            .and_then(|l| l.files.get(attachment_key).cloned())
            .ok_or_else(|| Error::ContentStore(format!("HTTP 404 for {}", attachment_key)))
    }
}

// ============ Extraction ============

/// Treats bytes as UTF-8 text with form feeds between pages.
///
/// Content containing `CORRUPT` fails like a damaged PDF.
#[derive(Default)]
pub struct TextPagesExtractor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextExtractor for TextPagesExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8(bytes).map_err(|e| Error::Extraction(e.to_string()))?;
        if text.contains("CORRUPT") {
            return Err(Error::Extraction("broken xref table".to_string()));
        }
        Ok(split_pages(&text))
    }
}

// ============ Embeddings ============

const KEYWORDS: &[&str] = &[
    "photosynthesis",
    "chlorophyll",
    "mitochondria",
    "enzyme",
    "galaxy",
    "quasar",
    "volcano",
    "magma",
];

/// Deterministic bag-of-keywords embedder.
///
/// Text containing `PANIC` crashes the calling task.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub texts_embedded: AtomicUsize,
}

impl KeywordEmbedder {
    pub const DIMENSION: usize = KEYWORDS.len() + 1;

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        v.push(0.1);
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        if texts.iter().any(|t| t.contains("PANIC")) {
            panic!("embedding backend crashed");
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn model_name(&self) -> &str {
        "keywords"
    }
}

// ============ Generation ============

/// Records prompts and answers with a fixed string
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Chlorophyll captures **light** [1].".to_string())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

// ============ Harness ============

pub struct Harness {
    pub zotero: Arc<FakeZotero>,
    pub extractor: Arc<TextPagesExtractor>,
    pub embedder: Arc<KeywordEmbedder>,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<RecordingGenerator>,
    pub meta: MetaDb,
    pub engine: Arc<IndexingEngine>,
    pub ctx: AppContext,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let meta = MetaDb::new(&dir.path().join("metadata.db")).await.unwrap();

        let zotero = FakeZotero::new();
        let extractor = Arc::new(TextPagesExtractor::default());
        let embedder = Arc::new(KeywordEmbedder::default());
        let store = Arc::new(MemoryStore::new(KeywordEmbedder::DIMENSION));
        let generator = Arc::new(RecordingGenerator::default());

        let mut config = Config::default();
        config.init_paths(Some(dir.path().to_path_buf()));
        config.embedding.dimension = KeywordEmbedder::DIMENSION;
        config.embedding.batch_size = 4;

        let ctx = AppContext::from_parts(
            config,
            meta.clone(),
            zotero.clone(),
            extractor.clone(),
            embedder.clone(),
            store.clone(),
        );

        Self {
            engine: ctx.indexer.clone(),
            zotero,
            extractor,
            embedder,
            store,
            generator,
            meta,
            ctx,
            _dir: dir,
        }
    }

    pub fn query_engine(&self) -> QueryEngine {
        QueryEngine::new(
            self.embedder.clone(),
            self.store.clone(),
            self.generator.clone(),
            QueryConfig::default(),
            LlmConfig::default(),
        )
    }

    pub fn chunk_config() -> ChunkConfig {
        ChunkConfig::default()
    }

    pub fn extractions(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }

    pub async fn chunk_count(&self, lib: &str) -> usize {
        self.store
            .all_chunks()
            .await
            .iter()
            .filter(|c| c.library_id == lib)
            .count()
    }
}
