//! # Notion client: the [`ContentSource`] used by the CLI
//!
//! Talks to the Notion REST API (version `2022-06-28`) over `reqwest` and maps
//! its JSON onto the core contract types. Responses are read as
//! `serde_json::Value` and picked apart field by field; anything the engine
//! does not use is ignored.
//!
//! Status mapping: 404 → `NotFound`, 429 → `RateLimited` (with `Retry-After`),
//! 5xx and transport timeouts → `Transient`, anything else → `Api`. Retrying
//! is left to the core.

use std::time::Duration;

use async_trait::async_trait;
use notion_mirror_core::contract::{
    Block, Container, ContentSource, Document, FormulaValue, Page, ParentRef, PropertyValue,
    RawProperty, RollupValue,
};
use notion_mirror_core::error::SourceError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error};

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

pub struct NotionClient {
    http: Client,
    base_url: String,
    token: String,
}

impl NotionClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, SourceError> {
        Self::with_base_url(token, timeout, NOTION_API_BASE)
    }

    pub fn with_base_url(token: &str, timeout: Duration, base_url: &str) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notion-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Value, SourceError> {
        let response = self.authed(request).send().await.map_err(transport_error)?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            error!(status = %status, url = %url, "Notion API returned error. Response body: {body}");
            return Err(classify(status, retry_after, &body));
        }
        debug!(status = %status, url = %url, "Notion API response");
        serde_json::from_str(&body).map_err(|e| SourceError::Decode(format!("{url}: {e}")))
    }

    async fn get(&self, url: String) -> Result<Value, SourceError> {
        self.send(self.http.get(&url), &url).await
    }

    async fn post(&self, url: String, body: Value) -> Result<Value, SourceError> {
        self.send(self.http.post(&url).json(&body), &url).await
    }
}

fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        SourceError::Transient(e.to_string())
    } else {
        SourceError::Decode(e.to_string())
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(api_message(body)),
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited { retry_after },
        s if s.is_server_error() => SourceError::Transient(format!("{s}: {}", api_message(body))),
        s => SourceError::Api {
            status: s.as_u16(),
            message: api_message(body),
        },
    }
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn paged_body(cursor: Option<String>) -> Value {
    let mut body = json!({ "page_size": PAGE_SIZE });
    if let Some(cursor) = cursor {
        body["start_cursor"] = Value::String(cursor);
    }
    body
}

/// Concatenated `plain_text` of a rich-text array.
pub fn plain_text(rich_text: Option<&Value>) -> String {
    text_runs(rich_text).concat()
}

fn text_runs(rich_text: Option<&Value>) -> Vec<String> {
    rich_text
        .and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|r| r.get("plain_text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn option_name(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| str_field(v, "name"))
}

fn date_start(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| str_field(v, "start"))
}

pub fn map_parent(parent: Option<&Value>) -> ParentRef {
    let Some(parent) = parent else {
        return ParentRef::Other;
    };
    match parent.get("type").and_then(Value::as_str) {
        Some("workspace") => ParentRef::Workspace,
        Some("database_id") => str_field(parent, "database_id")
            .map(ParentRef::Container)
            .unwrap_or(ParentRef::Other),
        Some("page_id") => str_field(parent, "page_id")
            .map(ParentRef::Document)
            .unwrap_or(ParentRef::Other),
        _ => ParentRef::Other,
    }
}

pub fn map_property(value: &Value) -> PropertyValue {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let inner = value.get(kind);
    match kind {
        "title" => PropertyValue::Title(text_runs(inner)),
        "rich_text" => PropertyValue::RichText(text_runs(inner)),
        "select" => PropertyValue::Select(option_name(inner)),
        "status" => PropertyValue::Status(option_name(inner)),
        "multi_select" => PropertyValue::MultiSelect(
            inner
                .and_then(Value::as_array)
                .map(|opts| opts.iter().filter_map(|o| str_field(o, "name")).collect())
                .unwrap_or_default(),
        ),
        "number" => PropertyValue::Number(inner.and_then(Value::as_f64)),
        "checkbox" => PropertyValue::Checkbox(inner.and_then(Value::as_bool).unwrap_or(false)),
        "date" => PropertyValue::Date(date_start(inner)),
        "created_time" | "last_edited_time" => {
            let stamp = inner.and_then(Value::as_str).unwrap_or_default().to_string();
            if kind == "created_time" {
                PropertyValue::CreatedTime(stamp)
            } else {
                PropertyValue::LastEditedTime(stamp)
            }
        }
        "formula" => match inner {
            Some(f) => map_formula(f),
            None => PropertyValue::Unsupported(kind.to_string()),
        },
        "rollup" => match inner {
            Some(r) => map_rollup(r),
            None => PropertyValue::Unsupported(kind.to_string()),
        },
        other => PropertyValue::Unsupported(other.to_string()),
    }
}

fn map_formula(formula: &Value) -> PropertyValue {
    let value = match formula.get("type").and_then(Value::as_str) {
        Some("string") => FormulaValue::String(str_field(formula, "string")),
        Some("number") => FormulaValue::Number(formula.get("number").and_then(Value::as_f64)),
        Some("boolean") => {
            FormulaValue::Boolean(formula.get("boolean").and_then(Value::as_bool).unwrap_or(false))
        }
        Some("date") => FormulaValue::Date(date_start(formula.get("date"))),
        other => return PropertyValue::Unsupported(format!("formula:{}", other.unwrap_or("unknown"))),
    };
    PropertyValue::Formula(value)
}

fn map_rollup(rollup: &Value) -> PropertyValue {
    let value = match rollup.get("type").and_then(Value::as_str) {
        Some("number") => RollupValue::Number(rollup.get("number").and_then(Value::as_f64)),
        Some("date") => RollupValue::Date(date_start(rollup.get("date"))),
        Some("array") => RollupValue::Array(
            rollup
                .get("array")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(map_property).collect())
                .unwrap_or_default(),
        ),
        other => return PropertyValue::Unsupported(format!("rollup:{}", other.unwrap_or("unknown"))),
    };
    PropertyValue::Rollup(value)
}

/// Map a page object. Properties come out sorted by name.
pub fn map_page(page: &Value) -> Result<Document, SourceError> {
    let id = str_field(page, "id").ok_or_else(|| SourceError::Decode("page without id".to_string()))?;
    let mut title = String::new();
    let mut properties = Vec::new();
    if let Some(props) = page.get("properties").and_then(Value::as_object) {
        for (name, value) in props {
            let mapped = map_property(value);
            if let PropertyValue::Title(runs) = &mapped {
                title = runs.concat();
            }
            properties.push(RawProperty {
                name: name.clone(),
                value: mapped,
            });
        }
    }
    Ok(Document {
        id,
        parent: map_parent(page.get("parent")),
        title: title.trim().to_string(),
        properties,
        created_time: str_field(page, "created_time"),
        last_edited_time: str_field(page, "last_edited_time"),
    })
}

pub fn map_block(block: &Value) -> Block {
    let kind = block.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let inner = block.get(kind);
    let text = || plain_text(inner.and_then(|i| i.get("rich_text")));
    match kind {
        "paragraph" => Block::Paragraph(text()),
        "heading_1" => Block::Heading1(text()),
        "heading_2" => Block::Heading2(text()),
        "heading_3" => Block::Heading3(text()),
        "bulleted_list_item" => Block::BulletedListItem(text()),
        "numbered_list_item" => Block::NumberedListItem(text()),
        "quote" => Block::Quote(text()),
        "code" => Block::Code {
            language: inner.and_then(|i| str_field(i, "language")).unwrap_or_default(),
            text: text(),
        },
        "callout" => Block::Callout {
            emoji: inner
                .and_then(|i| i.get("icon"))
                .and_then(|icon| str_field(icon, "emoji")),
            text: text(),
        },
        other => Block::Unsupported(other.to_string()),
    }
}

fn next_cursor(listing: &Value) -> Option<String> {
    let has_more = listing.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    if has_more {
        str_field(listing, "next_cursor")
    } else {
        None
    }
}

fn results(listing: &Value) -> &[Value] {
    listing
        .get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn page_listing(listing: &Value) -> Result<Page<Document>, SourceError> {
    let documents = results(listing)
        .iter()
        .filter(|r| r.get("object").and_then(Value::as_str) != Some("database"))
        .map(map_page)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page {
        results: documents,
        next_cursor: next_cursor(listing),
    })
}

#[async_trait]
impl ContentSource for NotionClient {
    async fn get_container(&self, container_id: &str) -> Result<Container, SourceError> {
        let db = self
            .get(format!("{}/databases/{container_id}", self.base_url))
            .await?;
        Ok(Container {
            id: str_field(&db, "id").unwrap_or_else(|| container_id.to_string()),
            name: plain_text(db.get("title")).trim().to_string(),
            parent: map_parent(db.get("parent")),
        })
    }

    async fn query_container(
        &self,
        container_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Document>, SourceError> {
        let listing = self
            .post(
                format!("{}/databases/{container_id}/query", self.base_url),
                paged_body(cursor),
            )
            .await?;
        page_listing(&listing)
    }

    async fn search_documents(&self, cursor: Option<String>) -> Result<Page<Document>, SourceError> {
        let mut body = paged_body(cursor);
        body["filter"] = json!({ "property": "object", "value": "page" });
        let listing = self
            .post(format!("{}/search", self.base_url), body)
            .await?;
        page_listing(&listing)
    }

    async fn get_document(&self, document_id: &str) -> Result<Document, SourceError> {
        let page = self
            .get(format!("{}/pages/{document_id}", self.base_url))
            .await?;
        map_page(&page)
    }

    async fn get_blocks(
        &self,
        document_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Block>, SourceError> {
        let mut url = format!(
            "{}/blocks/{document_id}/children?page_size={PAGE_SIZE}",
            self.base_url
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!("&start_cursor={}", urlencoding::encode(&cursor)));
        }
        let listing = self.get(url).await?;
        Ok(Page {
            results: results(&listing).iter().map(map_block).collect(),
            next_cursor: next_cursor(&listing),
        })
    }
}
