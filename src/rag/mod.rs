//! Question answering over indexed libraries
//!
//! Embeds the question, searches the requested libraries, packs the best
//! chunks into the context budget, generates an answer and maps every chunk
//! that went into the prompt to a citation.

mod format;
mod prompt;

pub use format::*;
pub use prompt::*;

use crate::config::{LlmConfig, QueryConfig};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::llm::Generator;
use crate::models::{AnswerFormat, QueryResult, SourceCitation};
use crate::store::{ScoredChunk, SearchFilter, VectorStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Answer returned when retrieval finds nothing above the score threshold
pub const NOT_FOUND_ANSWER: &str =
    "No relevant content was found in the selected libraries for this question.";

/// A question and where to look for its answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub question: String,
    /// Libraries to search; empty searches every indexed library
    pub library_ids: Vec<String>,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    /// Additional structured filters (authors, years, item types, tags)
    pub filters: SearchFilter,
    pub format: Option<AnswerFormat>,
}

impl QueryRequest {
    pub fn new(question: &str, library_ids: Vec<String>) -> Self {
        Self {
            question: question.to_string(),
            library_ids,
            ..Default::default()
        }
    }
}

/// Map a retrieved chunk to a citation.
///
/// A known page is the anchor; otherwise the stored preview is.
pub fn citation_for(result: &ScoredChunk) -> SourceCitation {
    let chunk = &result.chunk;
    SourceCitation {
        item_id: chunk.item_key.clone(),
        library_id: chunk.library_id.clone(),
        title: chunk.title.clone(),
        page_number: chunk.page_number,
        text_anchor: match chunk.page_number {
            Some(_) => None,
            None => Some(chunk.text_preview.clone()),
        },
        relevance_score: result.score,
    }
}

/// Retrieval-augmented query engine
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    query_config: QueryConfig,
    llm_config: LlmConfig,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        query_config: QueryConfig,
        llm_config: LlmConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            query_config,
            llm_config,
        }
    }

    /// Retrieve matching chunks without generating an answer
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<ScoredChunk>> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::InvalidRequest("Question must not be empty".to_string()));
        }

        let min_score = request.min_score.unwrap_or(self.query_config.min_score);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(Error::InvalidRequest(format!(
                "min_score must be between 0 and 1, got {}",
                min_score
            )));
        }

        let top_k = request
            .top_k
            .unwrap_or(self.query_config.default_top_k)
            .clamp(1, self.query_config.max_top_k.max(1));

        let mut filter = request.filters.clone();
        filter.library_ids = request.library_ids.clone();

        let vector = self.embedder.embed(question).await?;
        let results = self.store.search(vector, top_k, min_score, &filter).await?;

        // Backends apply the threshold too; this keeps the contract backend-independent
        Ok(results
            .into_iter()
            .filter(|r| r.score >= min_score)
            .take(top_k)
            .collect())
    }

    /// Answer a question with citations
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        let format = request.format.unwrap_or(self.query_config.answer_format);
        let results = self.retrieve(request).await?;

        info!(
            libraries = ?request.library_ids,
            "Query retrieved {} chunks",
            results.len()
        );

        if results.is_empty() {
            return Ok(QueryResult {
                question: request.question.clone(),
                answer: NOT_FOUND_ANSWER.to_string(),
                format,
                sources: Vec::new(),
                found: false,
            });
        }

        let context = select_context(results, self.llm_config.max_context_chars);
        let prompt = build_prompt(&request.question, &context);
        debug!(
            "Prompt with {} sources ({} chars)",
            context.len(),
            prompt.len()
        );

        let answer = self
            .generator
            .generate(
                &prompt,
                self.llm_config.max_tokens,
                self.llm_config.temperature,
            )
            .await?;

        Ok(QueryResult {
            question: request.question.clone(),
            answer: render_answer(&answer, format),
            format,
            sources: context.iter().map(citation_for).collect(),
            found: true,
        })
    }
}
