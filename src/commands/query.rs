//! Query command implementation

use crate::context::AppContext;
use crate::error::Result;
use crate::models::{AnswerFormat, QueryResult};
use crate::rag::QueryRequest;
use crate::store::SearchFilter;
use tracing::info;

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Libraries to search; empty means every indexed library
    pub library_ids: Vec<String>,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub filters: SearchFilter,
    pub format: Option<AnswerFormat>,
}

/// Answer a question from the indexed libraries
pub async fn cmd_query(
    ctx: &AppContext,
    question: &str,
    options: QueryOptions,
) -> Result<QueryResult> {
    let library_ids = if options.library_ids.is_empty() {
        ctx.meta
            .list_metadata()
            .await?
            .into_iter()
            .map(|m| m.library_id)
            .collect()
    } else {
        options.library_ids
    };

    info!(libraries = ?library_ids, "Query: {}", question);

    let request = QueryRequest {
        question: question.to_string(),
        library_ids,
        top_k: options.top_k,
        min_score: options.min_score,
        filters: options.filters,
        format: options.format,
    };

    ctx.query_engine()?.query(&request).await
}

pub fn print_query_result(result: &QueryResult) {
    println!("\n🔍 {}\n", result.question);
    println!("{}\n", result.answer);

    if !result.found {
        return;
    }

    println!("Sources:");
    for (i, source) in result.sources.iter().enumerate() {
        let location = match (source.page_number, &source.text_anchor) {
            (Some(page), _) => format!("p. {}", page),
            (None, Some(anchor)) => format!("\"{}...\"", anchor),
            (None, None) => "location unknown".to_string(),
        };
        println!(
            "  [{}] {} ({}) [score: {:.3}] item {} in library {}",
            i + 1,
            source.title,
            location,
            source.relevance_score,
            source.item_id,
            source.library_id
        );
    }
}
