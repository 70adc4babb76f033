//! Notion REST client: page search and page creation.

use serde::Deserialize;
use serde_json::{json, Value};

/// Notion limits a rich text item to 2000 characters.
const MAX_TEXT_LEN: usize = 2000;
/// Notion accepts at most 100 children per create request.
const MAX_BLOCKS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("notion api key not configured")]
    MissingKey,
    #[error("notion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notion api error: {0}")]
    Api(String),
}

/// Page summary returned by search and create.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NotionPage {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct NotionClient {
    base_url: String,
    api_key: Option<String>,
    version: String,
    client: reqwest::Client,
}

impl NotionClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, version: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            version: version.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> Result<reqwest::RequestBuilder, NotionError> {
        let key = self.api_key.as_ref().ok_or(NotionError::MissingKey)?;
        Ok(self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(key)
            .header("Notion-Version", self.version.as_str()))
    }

    /// POST /search: pages whose title matches `query`.
    pub async fn search_pages(&self, query: &str) -> Result<Vec<NotionPage>, NotionError> {
        let body = json!({
            "query": query,
            "filter": { "property": "object", "value": "page" }
        });
        let res = self.request("/search")?.json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(NotionError::Api(format!("{} {}", status, body)));
        }
        let data: SearchResponse = res.json().await?;
        Ok(data.results.iter().map(page_from_value).collect())
    }

    /// POST /pages: create a child page under `parent_page_id` with `content` as paragraphs.
    pub async fn create_page(
        &self,
        parent_page_id: &str,
        title: &str,
        content: &str,
    ) -> Result<NotionPage, NotionError> {
        let body = json!({
            "parent": { "page_id": parent_page_id },
            "properties": {
                "title": { "title": [ { "text": { "content": title } } ] }
            },
            "children": paragraph_blocks(content),
        });
        let res = self.request("/pages")?.json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(NotionError::Api(format!("{} {}", status, body)));
        }
        let data: Value = res.json().await?;
        Ok(page_from_value(&data))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// Extract id, url and the plain-text title from a page object. The title property name varies
/// (e.g. "title" or "Name"), so the first property of type "title" is used.
fn page_from_value(page: &Value) -> NotionPage {
    let title = page
        .get("properties")
        .and_then(|p| p.as_object())
        .and_then(|props| {
            props
                .values()
                .find(|v| v.get("type").and_then(|t| t.as_str()) == Some("title"))
        })
        .and_then(|v| v.get("title"))
        .and_then(|t| t.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(|s| s.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default();
    NotionPage {
        id: page
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        title,
        url: page.get("url").and_then(|v| v.as_str()).map(str::to_string),
    }
}

/// Split text into paragraph blocks: one per non-empty line, long lines chunked at the rich text limit.
fn paragraph_blocks(content: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    for line in content.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
        let chars: Vec<char> = line.chars().collect();
        for chunk in chars.chunks(MAX_TEXT_LEN) {
            if blocks.len() == MAX_BLOCKS {
                log::warn!("notion: content truncated at {} blocks", MAX_BLOCKS);
                return blocks;
            }
            let text: String = chunk.iter().collect();
            blocks.push(json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [ { "type": "text", "text": { "content": text } } ]
                }
            }));
        }
    }
    blocks
}
