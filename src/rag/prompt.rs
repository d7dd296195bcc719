//! Context selection and prompt construction

use crate::store::ScoredChunk;

/// Keep the best-scoring chunks that fit in `max_chars` of context.
///
/// Input is sorted by descending score first, then the lowest scores are
/// dropped until the rest fits. A single chunk larger than the budget is kept
/// and truncated so a question never goes out with empty context.
pub fn select_context(mut results: Vec<ScoredChunk>, max_chars: usize) -> Vec<ScoredChunk> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut used = 0;
    let mut selected = Vec::with_capacity(results.len());

    for mut result in results {
        let len = result.chunk.text.chars().count();
        if used + len <= max_chars {
            used += len;
            selected.push(result);
        } else if selected.is_empty() {
            result.chunk.text = result.chunk.text.chars().take(max_chars).collect();
            selected.push(result);
            break;
        } else {
            break;
        }
    }

    selected
}

/// Label used for a source in the prompt
pub fn source_label(result: &ScoredChunk) -> String {
    let chunk = &result.chunk;
    let mut label = chunk.title.clone();
    if let Some(year) = chunk.year {
        label.push_str(&format!(" ({})", year));
    }
    match chunk.page_number {
        Some(page) => label.push_str(&format!(", p. {}", page)),
        None if !chunk.text_preview.is_empty() => {
            label.push_str(&format!(", \"{}...\"", chunk.text_preview))
        }
        None => {}
    }
    label
}

/// Build the generation prompt from numbered sources and the question
pub fn build_prompt(question: &str, context: &[ScoredChunk]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the sources below. \
If the sources do not contain the answer, say so. \
Cite sources inline by number, for example [1].\n\n",
    );

    for (i, result) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {}\n{}\n\n",
            i + 1,
            source_label(result),
            result.chunk.text.trim()
        ));
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", question.trim()));
    prompt
}
