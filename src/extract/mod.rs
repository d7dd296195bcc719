//! Text extraction from attachment binaries
//!
//! Extractors turn raw attachment bytes into page-tagged text. Page numbers
//! are 1-indexed and left unset when the extractor cannot tell pages apart.

#[cfg(feature = "pdf")]
mod pdf;

#[cfg(feature = "pdf")]
pub use pdf::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Text of one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: Option<u32>,
    pub text: String,
}

/// Trait for attachment text extractors
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract ordered, page-tagged text from an attachment
    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>>;
}

/// Split plain-text extractor output on form feeds into numbered pages.
///
/// Output without any form feed is returned as one page of unknown number.
pub fn split_pages(raw: &str) -> Vec<PageText> {
    if !raw.contains('\x0C') {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        return vec![PageText {
            page_number: None,
            text: raw.to_string(),
        }];
    }

    raw.split('\x0C')
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PageText {
            page_number: Some(i as u32 + 1),
            text: text.to_string(),
        })
        .collect()
}

/// Extractor used when the crate is built without PDF support
pub struct UnsupportedExtractor;

#[async_trait]
impl TextExtractor for UnsupportedExtractor {
    async fn extract(&self, _bytes: Vec<u8>) -> Result<Vec<PageText>> {
        Err(Error::Extraction(
            "PDF support not compiled in; rebuild with --features pdf".to_string(),
        ))
    }
}

/// Create the extractor for this build
pub fn create_extractor() -> Arc<dyn TextExtractor> {
    #[cfg(feature = "pdf")]
    {
        Arc::new(PdfExtractor::new())
    }
    #[cfg(not(feature = "pdf"))]
    {
        Arc::new(UnsupportedExtractor)
    }
}
