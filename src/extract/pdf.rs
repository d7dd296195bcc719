//! PDF extraction via pdf-extract

use super::{PageText, TextExtractor};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// Extractor for PDF attachments
#[derive(Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>> {
        debug!("Extracting PDF ({} bytes)", bytes.len());

        // pdf-extract is synchronous and CPU bound
        let raw_pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
            .await
            .map_err(|e| Error::Extraction(format!("Task join error: {}", e)))??;

        let pages = number_pages(raw_pages);
        if pages.is_empty() {
            return Err(Error::Extraction(
                "PDF contains no extractable text".to_string(),
            ));
        }
        Ok(pages)
    }
}

/// pdf-extract panics on some malformed files; treat that as a failed extraction
fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(Error::Extraction(e.to_string())),
        Err(_) => Err(Error::Extraction("pdf-extract panicked".to_string())),
    }
}

/// Number pages from 1 in document order, dropping blank pages
fn number_pages(pages: Vec<String>) -> Vec<PageText> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PageText {
            page_number: Some(i as u32 + 1),
            text,
        })
        .collect()
}
