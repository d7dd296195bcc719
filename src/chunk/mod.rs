//! Text chunking for page-tagged attachment text
//!
//! This module splits extracted pages into chunks while:
//! - Keeping sentences whole whenever they fit
//! - Never letting a chunk span two pages, so each chunk has one page number
//! - Carrying a small sentence overlap between neighbouring chunks
//! - Computing content hashes and citation previews

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::extract::PageText;
use blake3::Hasher;

/// A chunk produced from one page
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The chunk text
    pub text: String,

    /// Page the text came from (1-indexed), when known
    pub page_number: Option<u32>,

    /// Position in the attachment's chunk sequence (0-based, across pages)
    pub index: u32,

    /// Blake3 hash of the normalized text
    pub hash: String,

    /// First few words, used as a citation anchor
    pub preview: String,
}

/// Chunk a sequence of pages
pub fn chunk_pages(pages: &[PageText], config: &ChunkConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut index = 0u32;

    for page in pages {
        let text = normalize_text(&page.text);
        if text.is_empty() {
            continue;
        }

        for body in chunk_text(&text, config.max_chars, config.overlap_chars) {
            chunks.push(TextChunk {
                hash: compute_text_hash(&body),
                preview: text_preview(&body, config.preview_words),
                text: body,
                page_number: page.page_number,
                index,
            });
            index += 1;
        }
    }

    chunks
}

/// Sentence-accumulating splitter for a single page of text.
///
/// Sentences are appended until the next one would overflow `max_chars`.
/// The next chunk then starts with the trailing sentences of the previous
/// one that fit within `overlap_chars`.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    for sentence in split_sentences(text) {
        sentences.extend(split_long_sentence(sentence, max_chars));
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    // Number of sentences at the head of `current` that were carried over
    let mut carried = 0usize;

    for sentence in sentences {
        let len = char_len(&sentence);
        let joined_len = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };

        if joined_len > max_chars && current.len() > carried {
            chunks.push(current.join(" "));

            let overlap = overlap_tail(&current, overlap_chars);
            carried = overlap.len();
            current_len = joined_length(&overlap);
            current = overlap;

            // Drop the overlap if it would still not leave room
            if current_len + 1 + len > max_chars {
                current.clear();
                current_len = 0;
                carried = 0;
            }
        }

        current_len = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };
        current.push(sentence);
    }

    if current.len() > carried {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Trailing sentences whose joined length stays within `overlap_chars`
fn overlap_tail(sentences: &[String], overlap_chars: usize) -> Vec<String> {
    if overlap_chars == 0 {
        return Vec::new();
    }

    let mut tail: Vec<String> = Vec::new();
    let mut total = 0usize;

    for sentence in sentences.iter().rev() {
        let len = char_len(sentence);
        let added = if tail.is_empty() { len } else { total + 1 + len };
        if added > overlap_chars {
            break;
        }
        total = added;
        tail.push(sentence.clone());
    }

    tail.reverse();
    tail
}

fn joined_length(sentences: &[String]) -> usize {
    if sentences.is_empty() {
        return 0;
    }
    sentences.iter().map(|s| char_len(s)).sum::<usize>() + sentences.len() - 1
}

/// First `words` words of a chunk
pub fn text_preview(text: &str, words: usize) -> String {
    text.split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute a stable hash for binary content
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Compute a stable hash for normalized text
pub fn compute_text_hash(text: &str) -> String {
    compute_content_hash(normalize_text(text).to_lowercase().as_bytes())
}
