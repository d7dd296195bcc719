//! Client for the Zotero local HTTP API

use super::{ContentItem, ContentStore, Creator, LibraryInfo};
use crate::error::{Error, Result};
use crate::models::LibraryType;
use async_trait::async_trait;
use reqwest::{redirect, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Page size for item listings
pub const PAGE_SIZE: usize = 100;

/// Library id the local API uses for the signed-in user
pub const LOCAL_USER_ID: &str = "0";

#[derive(Debug, Deserialize)]
struct ApiItem {
    key: String,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    data: ApiItemData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiItemData {
    item_type: String,
    title: String,
    creators: Vec<Creator>,
    date: Option<String>,
    tags: Vec<ApiTag>,
    parent_item: Option<String>,
    content_type: Option<String>,
    publication_title: Option<String>,
    relations: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct ApiGroup {
    id: i64,
    #[serde(default)]
    data: Option<ApiGroupData>,
}

#[derive(Debug, Deserialize)]
struct ApiGroupData {
    #[serde(default)]
    name: String,
}

impl From<ApiItem> for ContentItem {
    fn from(item: ApiItem) -> Self {
        let data = item.data;
        let same_as = match data.relations.get("owl:sameAs") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(values)) => values.iter().find_map(|v| v.as_str().map(String::from)),
            _ => None,
        };

        Self {
            key: item.key,
            version: item.version,
            item_type: data.item_type,
            title: data.title,
            creators: data.creators,
            date: data.date.filter(|d| !d.is_empty()),
            tags: data.tags.into_iter().map(|t| t.tag).collect(),
            parent_item: data.parent_item,
            content_type: data.content_type,
            publication: data.publication_title.filter(|p| !p.is_empty()),
            same_as,
        }
    }
}

/// Zotero local API client
pub struct ZoteroClient {
    client: Client,
    base_url: Url,
}

impl ZoteroClient {
    /// Create a client for `base_url` (e.g. `http://localhost:23119`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        // File downloads answer with a redirect to a file:// URL
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, base_url })
    }

    fn library_url(&self, library_id: &str, library_type: LibraryType, path: &str) -> Result<Url> {
        let raw = format!(
            "{}/api/{}/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            library_type.api_segment(),
            library_id,
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&raw)?)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_connect() {
            Error::ContentStoreUnavailable(format!(
                "Unable to connect to Zotero at {}: {}",
                self.base_url, e
            ))
        } else if e.is_timeout() {
            Error::ContentStore(format!("Request to Zotero timed out: {}", e))
        } else {
            Error::ContentStore(e.to_string())
        }
    }

    async fn get(&self, url: Url) -> Result<Response> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))
    }

    fn check_status(response: &Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Error::ContentStore(format!(
            "HTTP {} from {}",
            status,
            response.url()
        )))
    }

    async fn json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        let response = self.get(url).await?;
        Self::check_status(&response)?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::ContentStore(format!("Malformed Zotero response: {}", e)))
    }

    /// Check whether the local API answers at all
    pub async fn ping(&self) -> bool {
        let Ok(url) = self.base_url.join("connector/ping") else {
            return false;
        };
        matches!(self.client.get(url).send().await, Ok(r) if r.status().is_success())
    }

    async fn follow_file_redirect(&self, response: Response) -> Result<Vec<u8>> {
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::ContentStore("Redirect without location".to_string()))?;
        let target = Url::parse(location)?;

        if target.scheme() == "file" {
            let path = target
                .to_file_path()
                .map_err(|_| Error::ContentStore(format!("Bad file location: {}", target)))?;
            debug!("Reading attachment from {:?}", path);
            return Ok(tokio::fs::read(&path).await?);
        }

        let response = self.get(target).await?;
        Self::check_status(&response)?;
        Ok(response.bytes().await.map_err(|e| self.map_send_error(e))?.to_vec())
    }
}

#[async_trait]
impl ContentStore for ZoteroClient {
    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>> {
        // Touch the user library so connectivity errors surface here
        let mut url = self.library_url(LOCAL_USER_ID, LibraryType::User, "items")?;
        url.query_pairs_mut().append_pair("limit", "1");
        let response = self.get(url).await?;
        Self::check_status(&response)?;

        let mut libraries = vec![LibraryInfo {
            id: LOCAL_USER_ID.to_string(),
            name: "My Library".to_string(),
            library_type: LibraryType::User,
        }];

        let groups_url = self.library_url(LOCAL_USER_ID, LibraryType::User, "groups")?;
        let groups: Vec<ApiGroup> = self.json(groups_url).await?;
        libraries.extend(groups.into_iter().map(|g| LibraryInfo {
            id: g.id.to_string(),
            name: g
                .data
                .map(|d| d.name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Group {}", g.id)),
            library_type: LibraryType::Group,
        }));

        Ok(libraries)
    }

    async fn list_items(
        &self,
        library_id: &str,
        library_type: LibraryType,
        since: Option<i64>,
    ) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        let mut start = 0usize;

        loop {
            let mut url = self.library_url(library_id, library_type, "items")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("start", &start.to_string());
                query.append_pair("limit", &PAGE_SIZE.to_string());
                if let Some(version) = since {
                    query.append_pair("since", &version.to_string());
                }
            }

            let page: Vec<ApiItem> = self.json(url).await?;
            let page_len = page.len();
            items.extend(page.into_iter().map(ContentItem::from));

            if page_len < PAGE_SIZE {
                break;
            }
            start += page_len;
        }

        info!(
            library_id = %library_id,
            since = ?since,
            "Fetched {} items from Zotero",
            items.len()
        );
        Ok(items)
    }

    async fn get_item(
        &self,
        library_id: &str,
        library_type: LibraryType,
        item_key: &str,
    ) -> Result<Option<ContentItem>> {
        let url = self.library_url(library_id, library_type, &format!("items/{}", item_key))?;
        let response = self.get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check_status(&response)?;
        let item: ApiItem = response
            .json()
            .await
            .map_err(|e| Error::ContentStore(format!("Malformed Zotero response: {}", e)))?;
        Ok(Some(item.into()))
    }

    async fn children(
        &self,
        library_id: &str,
        library_type: LibraryType,
        item_key: &str,
    ) -> Result<Vec<ContentItem>> {
        let url = self.library_url(
            library_id,
            library_type,
            &format!("items/{}/children", item_key),
        )?;
        let children: Vec<ApiItem> = self.json(url).await?;
        Ok(children.into_iter().map(ContentItem::from).collect())
    }

    async fn download(
        &self,
        library_id: &str,
        library_type: LibraryType,
        attachment_key: &str,
    ) -> Result<Vec<u8>> {
        let url = self.library_url(
            library_id,
            library_type,
            &format!("items/{}/file", attachment_key),
        )?;
        let response = self.get(url).await?;

        if response.status().is_redirection() {
            return self.follow_file_redirect(response).await;
        }

        Self::check_status(&response)?;
        Ok(response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(e))?
            .to_vec())
    }
}
