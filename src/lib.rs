//! zotero-rag: incremental RAG indexing and question answering over Zotero libraries.
//!
//! Items and PDF attachments come from Zotero's local API. Extracted pages are
//! chunked, embedded and stored in Qdrant with bibliographic metadata, while
//! per-library index state, deduplication records and run history live in
//! SQLite. Questions are answered from retrieved chunks with page-level
//! citations.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod content;
pub mod context;
pub mod embed;
pub mod error;
pub mod extract;
pub mod index;
pub mod jobs;
pub mod llm;
pub mod meta;
pub mod models;
pub mod progress;
pub mod rag;
pub mod server;
pub mod store;

pub use error::{Error, Result};
