//! Content store access
//!
//! The content store is the reference manager holding items, their PDF
//! attachments and a monotonically increasing version per item.

mod zotero;

pub use zotero::*;

use crate::error::Result;
use crate::models::LibraryType;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Item types that never carry indexable content of their own
const NON_CONTENT_TYPES: &[&str] = &["attachment", "note", "annotation"];

/// Creator roles that count as authors in citations
const AUTHOR_ROLES: &[&str] = &["author", "editor"];

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A library visible in the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
}

/// A creator on an item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default)]
    pub creator_type: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Single-field name (institutions)
    #[serde(default)]
    pub name: Option<String>,
}

impl Creator {
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// An item or attachment as reported by the content store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub key: String,
    pub version: i64,
    pub item_type: String,
    pub title: String,
    pub creators: Vec<Creator>,
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub parent_item: Option<String>,
    pub content_type: Option<String>,
    pub publication: Option<String>,
    /// Cross-library identity (`owl:sameAs`) when present
    pub same_as: Option<String>,
}

impl ContentItem {
    pub fn is_attachment(&self) -> bool {
        self.item_type == "attachment"
    }

    pub fn is_pdf_attachment(&self) -> bool {
        self.is_attachment() && self.content_type.as_deref() == Some(PDF_CONTENT_TYPE)
    }

    /// Regular items are the ones that own attachments and get indexed
    pub fn is_regular(&self) -> bool {
        !NON_CONTENT_TYPES.contains(&self.item_type.as_str())
    }

    /// Author and editor names in creator order
    pub fn authors(&self) -> Vec<String> {
        self.creators
            .iter()
            .filter(|c| AUTHOR_ROLES.contains(&c.creator_type.as_str()))
            .filter_map(Creator::display_name)
            .collect()
    }

    /// First plausible publication year in the date field
    pub fn year(&self) -> Option<i32> {
        extract_year(self.date.as_deref()?)
    }
}

fn year_regex() -> Option<&'static Regex> {
    static YEAR: OnceLock<Option<Regex>> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").ok())
        .as_ref()
}

/// Extract a four-digit 19xx/20xx year from a free-form date
pub fn extract_year(date: &str) -> Option<i32> {
    year_regex()?.find(date)?.as_str().parse().ok()
}

/// Read-only access to the reference manager
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Libraries the store exposes
    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>>;

    /// All items, or only those modified after `since`
    async fn list_items(
        &self,
        library_id: &str,
        library_type: LibraryType,
        since: Option<i64>,
    ) -> Result<Vec<ContentItem>>;

    /// A single item by key
    async fn get_item(
        &self,
        library_id: &str,
        library_type: LibraryType,
        item_key: &str,
    ) -> Result<Option<ContentItem>>;

    /// Child items (attachments, notes) of an item
    async fn children(
        &self,
        library_id: &str,
        library_type: LibraryType,
        item_key: &str,
    ) -> Result<Vec<ContentItem>>;

    /// Raw bytes of an attachment file
    async fn download(
        &self,
        library_id: &str,
        library_type: LibraryType,
        attachment_key: &str,
    ) -> Result<Vec<u8>>;
}
