//! Libraries command implementation

use crate::context::AppContext;
use crate::error::Result;
use crate::models::LibraryType;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A library as reported by Zotero, with local index state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
    pub indexed: bool,
    pub last_indexed_version: Option<i64>,
    pub last_indexed_at: Option<String>,
    pub total_chunks: Option<i64>,
}

/// List the libraries Zotero exposes
pub async fn cmd_libraries(ctx: &AppContext) -> Result<Vec<LibraryEntry>> {
    info!("Listing libraries");

    let libraries = ctx.content.list_libraries().await?;
    let mut entries = Vec::with_capacity(libraries.len());

    for lib in libraries {
        let meta = ctx.meta.get_metadata(&lib.id).await?;
        entries.push(LibraryEntry {
            indexed: meta.is_some(),
            last_indexed_version: meta.as_ref().map(|m| m.last_indexed_version),
            last_indexed_at: meta.as_ref().map(|m| m.last_indexed_at.clone()),
            total_chunks: meta.as_ref().map(|m| m.total_chunks),
            id: lib.id,
            name: lib.name,
            library_type: lib.library_type,
        });
    }

    Ok(entries)
}

pub fn print_libraries(entries: &[LibraryEntry]) {
    if entries.is_empty() {
        println!("No libraries found. Is Zotero running with the local API enabled?");
        return;
    }

    println!("{:<10} {:<6} {:<10} NAME", "ID", "TYPE", "CHUNKS");
    for entry in entries {
        let chunks = entry
            .total_chunks
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<6} {:<10} {}",
            entry.id,
            entry.library_type.to_string(),
            chunks,
            entry.name
        );
    }
}
