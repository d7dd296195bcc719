//! Sentence and word boundary helpers for chunking

use unicode_segmentation::UnicodeSegmentation;

/// Split text into trimmed, non-empty sentences
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Break a sentence that is longer than `max_chars` at word boundaries.
///
/// A single word longer than `max_chars` is emitted on its own.
pub fn split_long_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    if char_len(sentence) <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        let needed = if current.is_empty() {
            char_len(word)
        } else {
            char_len(&current) + 1 + char_len(word)
        };

        if needed > max_chars && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Clean up text coming out of PDF extraction.
///
/// Joins words hyphenated across line breaks and collapses runs of
/// whitespace to a single space.
pub fn normalize_text(text: &str) -> String {
    let dehyphenated = text.replace("-\n", "");
    dehyphenated.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length in characters, not bytes
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}
