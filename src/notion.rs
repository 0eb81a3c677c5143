//! Notion implementation of [`ExternalStore`].
//!
//! Talks to the Notion REST API directly with `reqwest`. The calendar is a
//! Notion database; each assignment is a page whose body holds one
//! paragraph block with the description.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | query | `POST /v1/databases/{id}/query` (paginated by `start_cursor`) |
//! | schema | `GET /v1/databases/{id}` |
//! | create | `POST /v1/pages` |
//! | update | `PATCH /v1/pages/{id}` |
//! | first block | `GET /v1/blocks/{id}/children?page_size=1` |
//! | block update | `PATCH /v1/blocks/{id}` |
//!
//! Non-2xx responses become [`SyncError::Fetch`] with the status and the
//! start of the body. Nothing is retried.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::{ClassTag, TagColor};
use crate::store::{
    CollectionSchema, ContentBlock, ExternalStore, FieldKind, Properties, PropertyValue,
    RichText, StoredRecord, CLASS_PROPERTY, LINK_PROPERTY,
};

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion caps a single rich text object at this many characters.
const RICH_TEXT_LIMIT: usize = 2000;

/// Client for one Notion integration token.
pub struct NotionStore {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl NotionStore {
    pub fn new(config: &StoreConfig) -> SyncResult<Self> {
        Self::with_api_base(config, NOTION_API)
    }

    /// Point the client at a different API root (e.g. a local mock).
    pub fn with_api_base(config: &StoreConfig, api_base: &str) -> SyncResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            token: config.token.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> SyncResult<Value> {
        let url = format!("{}{}", self.api_base, path);
        debug!(%method, %url, "notion request");

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("{} {}: {}", method, url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(SyncError::Fetch(format!(
                "Notion API error {} on {} {}: {}",
                status,
                method,
                path,
                body_text.chars().take(500).collect::<String>()
            )));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ExternalStore for NotionStore {
    async fn query_collection(&self, collection_id: &str) -> SyncResult<Vec<StoredRecord>> {
        let path = format!("/databases/{}/query", collection_id);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = match cursor {
                Some(ref c) => json!({ "start_cursor": c }),
                None => json!({}),
            };
            let page = self.request(Method::POST, &path, Some(body)).await?;

            let results = page
                .get("results")
                .and_then(|r| r.as_array())
                .ok_or_else(|| invalid("query response has no results array"))?;
            for item in results {
                records.push(parse_page(item)?);
            }

            let has_more = page.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = page
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }

        debug!(count = records.len(), "queried existing records");
        Ok(records)
    }

    async fn collection_schema(&self, collection_id: &str) -> SyncResult<CollectionSchema> {
        let db = self
            .request(Method::GET, &format!("/databases/{}", collection_id), None)
            .await?;
        parse_schema(&db)
    }

    async fn create_record(
        &self,
        collection_id: &str,
        properties: &Properties,
        content: &[ContentBlock],
    ) -> SyncResult<StoredRecord> {
        let body = json!({
            "parent": { "database_id": collection_id },
            "properties": properties_json(properties),
            "children": content.iter().map(block_json).collect::<Vec<_>>(),
        });
        let page = self.request(Method::POST, "/pages", Some(body)).await?;
        parse_page(&page)
    }

    async fn update_record(
        &self,
        record_id: &str,
        properties: &Properties,
    ) -> SyncResult<StoredRecord> {
        let body = json!({ "properties": properties_json(properties) });
        let page = self
            .request(Method::PATCH, &format!("/pages/{}", record_id), Some(body))
            .await?;
        parse_page(&page)
    }

    async fn first_block_id(&self, record_id: &str) -> SyncResult<Option<String>> {
        let children = self
            .request(
                Method::GET,
                &format!("/blocks/{}/children?page_size=1", record_id),
                None,
            )
            .await?;
        Ok(children
            .get("results")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .and_then(|b| b.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn update_block(&self, block_id: &str, block: &ContentBlock) -> SyncResult<()> {
        let body = match block {
            ContentBlock::Paragraph { text } => {
                json!({ "paragraph": { "rich_text": text_json(text) } })
            }
        };
        self.request(Method::PATCH, &format!("/blocks/{}", block_id), Some(body))
            .await?;
        Ok(())
    }
}

fn invalid(msg: &str) -> SyncError {
    SyncError::Fetch(format!("invalid Notion response: {}", msg))
}

// ============ Wire encoding ============

fn properties_json(properties: &Properties) -> Value {
    let map = properties
        .iter()
        .map(|(name, value)| (name.clone(), property_json(value)))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map)
}

fn property_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(texts) => json!({ "title": rich_text_json(texts) }),
        PropertyValue::RichText(texts) => json!({ "rich_text": rich_text_json(texts) }),
        PropertyValue::Date(date) => json!({
            "date": {
                "start": date.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "end": date.end.map(|e| e.format("%Y-%m-%dT%H:%M:%S").to_string()),
                "time_zone": Value::Null,
            }
        }),
        PropertyValue::MultiSelect(options) => json!({
            "multi_select": options
                .iter()
                .map(|o| json!({ "name": o.name, "color": o.color.as_str() }))
                .collect::<Vec<_>>()
        }),
        PropertyValue::Number(n) => json!({ "number": n }),
    }
}

fn rich_text_json(texts: &[RichText]) -> Vec<Value> {
    texts
        .iter()
        .flat_map(|t| {
            split_text(&t.content).into_iter().map(move |segment| {
                json!({
                    "type": "text",
                    "text": {
                        "content": segment,
                        "link": t.link.as_ref().map(|url| json!({ "url": url })),
                    }
                })
            })
        })
        .collect()
}

fn text_json(text: &str) -> Vec<Value> {
    rich_text_json(&[RichText::plain(text)])
}

fn block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Paragraph { text } => json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": text_json(text) }
        }),
    }
}

/// Split text into chunks Notion accepts. Empty text stays one empty chunk
/// so the property is cleared rather than left untouched.
fn split_text(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(RICH_TEXT_LIMIT)
        .map(|c| c.iter().collect())
        .collect()
}

// ============ Response decoding ============

fn parse_page(page: &Value) -> SyncResult<StoredRecord> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("page has no id"))?
        .to_string();
    let properties = page.get("properties");

    let link = properties
        .and_then(|p| p.get(LINK_PROPERTY))
        .and_then(|l| l.get("rich_text"))
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .and_then(|t| t.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let class_tags = properties
        .and_then(|p| p.get(CLASS_PROPERTY))
        .and_then(|c| c.get("multi_select"))
        .and_then(Value::as_array)
        .map(|options| options.iter().filter_map(parse_tag).collect())
        .unwrap_or_default();

    Ok(StoredRecord {
        id,
        link,
        class_tags,
    })
}

fn parse_tag(option: &Value) -> Option<ClassTag> {
    Some(ClassTag {
        id: option.get("id")?.as_str()?.to_string(),
        name: option.get("name")?.as_str()?.to_string(),
        color: option
            .get("color")
            .and_then(|c| serde_json::from_value::<TagColor>(c.clone()).ok())
            .unwrap_or_default(),
    })
}

fn parse_schema(db: &Value) -> SyncResult<CollectionSchema> {
    let properties = db
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("database has no properties"))?;

    let mut schema = CollectionSchema::default();
    for (name, def) in properties {
        let kind = def.get("type").and_then(Value::as_str).unwrap_or("unknown");
        let field = if kind == "multi_select" {
            let options = def
                .get("multi_select")
                .and_then(|m| m.get("options"))
                .and_then(Value::as_array)
                .map(|o| o.iter().filter_map(parse_tag).collect())
                .unwrap_or_default();
            FieldKind::MultiSelect { options }
        } else {
            FieldKind::Other(kind.to_string())
        };
        schema.fields.insert(name.clone(), field);
    }
    Ok(schema)
}
