//! Service wiring shared by the CLI and the HTTP server

use crate::config::Config;
use crate::content::{ContentStore, LibraryInfo, ZoteroClient};
use crate::embed::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::extract::{create_extractor, TextExtractor};
use crate::index::IndexingEngine;
use crate::jobs::JobTracker;
use crate::llm::{create_generator, Generator};
use crate::meta::MetaDb;
use crate::rag::QueryEngine;
use crate::store::{QdrantStore, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// All long-lived services, built once from a [`Config`]
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub meta: MetaDb,
    pub content: Arc<dyn ContentStore>,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub indexer: Arc<IndexingEngine>,
    pub jobs: JobTracker,
}

impl AppContext {
    /// Connect to the configured Zotero, Qdrant and SQLite backends
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_secs(config.indexing.request_timeout_secs);

        let meta = MetaDb::connect(&config).await?;
        let content: Arc<dyn ContentStore> =
            Arc::new(ZoteroClient::new(&config.zotero_url, timeout)?);
        let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::connect(&config)?);
        let embedder = create_embedder(&config.embedding, timeout)?;

        Ok(Self::from_parts(
            config,
            meta,
            content,
            create_extractor(),
            embedder,
            store,
        ))
    }

    /// Assemble a context from already-built services
    pub fn from_parts(
        config: Config,
        meta: MetaDb,
        content: Arc<dyn ContentStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let indexer = Arc::new(IndexingEngine::new(
            content.clone(),
            extractor,
            embedder.clone(),
            store.clone(),
            meta.clone(),
            config.chunk.clone(),
            config.embedding.batch_size,
        ));
        let jobs = JobTracker::new(indexer.clone());

        Self {
            config,
            meta,
            content,
            store,
            embedder,
            indexer,
            jobs,
        }
    }

    /// Build the generator from configuration
    pub fn generator(&self) -> Result<Arc<dyn Generator>> {
        let timeout = Duration::from_secs(self.config.indexing.request_timeout_secs);
        create_generator(&self.config.llm, timeout)
    }

    /// Query engine using the configured generator
    pub fn query_engine(&self) -> Result<QueryEngine> {
        Ok(self.query_engine_with(self.generator()?))
    }

    pub fn query_engine_with(&self, generator: Arc<dyn Generator>) -> QueryEngine {
        QueryEngine::new(
            self.embedder.clone(),
            self.store.clone(),
            generator,
            self.config.query.clone(),
            self.config.llm.clone(),
        )
    }

    /// Look a library up in the content store, falling back to stored metadata
    pub async fn resolve_library(&self, library_id: &str) -> Result<LibraryInfo> {
        match self.content.list_libraries().await {
            Ok(libraries) => {
                if let Some(lib) = libraries.into_iter().find(|l| l.id == library_id) {
                    return Ok(lib);
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Could not list libraries: {}", e),
        }

        match self.meta.get_metadata(library_id).await? {
            Some(meta) => Ok(LibraryInfo {
                id: meta.library_id,
                name: meta.library_name,
                library_type: meta.library_type,
            }),
            None => Err(Error::InvalidRequest(format!(
                "Unknown library: {}",
                library_id
            ))),
        }
    }
}
