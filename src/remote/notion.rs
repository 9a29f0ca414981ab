//! Notion REST API client
//!
//! Notion distinguishes `select` from `status` and `title` from `rich_text`
//! on the wire while the engine folds them into one [`FieldType`]. The client
//! therefore remembers the raw property type of every database it has read
//! and encodes writes against it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};

use crate::schema::{FieldMap, FieldType, FieldValue};

use super::errors::{RemoteError, RemoteResult};
use super::types::{Record, RecordFilter, SchemaSnapshot};
use super::RemoteStore;

pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_API_VERSION: &str = "2022-06-28";

const PAGE_SIZE: usize = 100;

/// Connection settings for [`NotionClient`]
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub api_base: String,
    pub token: String,
    pub version: String,
    pub timeout: Duration,
}

impl NotionSettings {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw Notion property types of one database, keyed by property name
type RawTypes = BTreeMap<String, String>;

/// [`RemoteStore`] backed by the Notion REST API.
pub struct NotionClient {
    http: Client,
    settings: NotionSettings,
    raw_types: Mutex<HashMap<String, RawTypes>>,
}

impl NotionClient {
    pub fn new(settings: NotionSettings) -> RemoteResult<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            settings,
            raw_types: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.api_base.trim_end_matches('/'), path)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Value> {
        let response = request
            .bearer_auth(&self.settings.token)
            .header("Notion-Version", &self.settings.version)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        read_body(status, &text)
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.settings.timeout)
        } else {
            RemoteError::Transport(err.to_string())
        }
    }

    async fn fetch_database(&self, collection_id: &str) -> RemoteResult<SchemaSnapshot> {
        let body = self
            .send(self.http.get(self.url(&format!("databases/{}", collection_id))))
            .await?;
        let (snapshot, raw) = decode_schema(&body)?;
        self.remember(collection_id, raw);
        Ok(snapshot)
    }

    fn remember(&self, collection_id: &str, raw: RawTypes) {
        let mut memo = self.raw_types.lock().unwrap_or_else(|p| p.into_inner());
        memo.insert(collection_id.to_string(), raw);
    }

    fn remembered(&self, collection_id: &str) -> Option<RawTypes> {
        let memo = self.raw_types.lock().unwrap_or_else(|p| p.into_inner());
        memo.get(collection_id).cloned()
    }

    async fn raw_types_of(&self, collection_id: &str) -> RemoteResult<RawTypes> {
        if let Some(raw) = self.remembered(collection_id) {
            return Ok(raw);
        }
        self.fetch_database(collection_id).await?;
        Ok(self.remembered(collection_id).unwrap_or_default())
    }
}

#[async_trait]
impl RemoteStore for NotionClient {
    async fn get_schema(&self, collection_id: &str) -> RemoteResult<SchemaSnapshot> {
        self.fetch_database(collection_id).await
    }

    async fn patch_schema(
        &self,
        collection_id: &str,
        field: &str,
        options: &[String],
    ) -> RemoteResult<()> {
        // Always re-read: the memo may predate a manual type change.
        self.fetch_database(collection_id).await?;
        let raw = self.remembered(collection_id).unwrap_or_default();
        let raw_type = match raw.get(field).map(String::as_str) {
            Some(t @ ("select" | "multi_select" | "status")) => t.to_string(),
            Some(other) => {
                return Err(RemoteError::Rejected {
                    status: 400,
                    message: format!("property '{}' of type {} has no options", field, other),
                })
            }
            None => {
                return Err(RemoteError::Rejected {
                    status: 400,
                    message: format!("property '{}' does not exist", field),
                })
            }
        };

        let options: Vec<Value> = options.iter().map(|o| json!({ "name": o })).collect();
        let body = json!({
            "properties": { field: { raw_type: { "options": options } } }
        });
        self.send(
            self.http
                .patch(self.url(&format!("databases/{}", collection_id)))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        filter: Option<&RecordFilter>,
    ) -> RemoteResult<Vec<Record>> {
        let raw = self.raw_types_of(collection_id).await?;
        let encoded_filter = filter.and_then(|f| encode_filter(f, &raw));

        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(f) = &encoded_filter {
                body["filter"] = f.clone();
            }
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let page = self
                .send(
                    self.http
                        .post(self.url(&format!("databases/{}/query", collection_id)))
                        .json(&body),
                )
                .await?;

            for item in page
                .get("results")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let record = decode_page(item)?;
                if filter.map_or(true, |f| f.matches(&record)) {
                    records.push(record);
                }
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
        Ok(records)
    }

    async fn create_record(&self, collection_id: &str, fields: &FieldMap) -> RemoteResult<Record> {
        let raw = self.raw_types_of(collection_id).await?;
        let body = json!({
            "parent": { "database_id": collection_id },
            "properties": encode_properties(fields, &raw)?,
        });
        let page = self
            .send(self.http.post(self.url("pages")).json(&body))
            .await?;
        decode_page(&page)
    }

    async fn update_record(&self, record_id: &str, fields: &FieldMap) -> RemoteResult<Record> {
        let current = self
            .send(self.http.get(self.url(&format!("pages/{}", record_id))))
            .await?;
        let raw = page_raw_types(&current);
        let body = json!({ "properties": encode_properties(fields, &raw)? });
        let page = self
            .send(
                self.http
                    .patch(self.url(&format!("pages/{}", record_id)))
                    .json(&body),
            )
            .await?;
        decode_page(&page)
    }

    async fn get_record(&self, record_id: &str) -> RemoteResult<Record> {
        let page = self
            .send(self.http.get(self.url(&format!("pages/{}", record_id))))
            .await?;
        decode_page(&page)
    }
}

fn status_error(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Transport(format!("rate limited: {}", message)),
        s if s.is_server_error() => RemoteError::Transport(format!("status {}: {}", s.as_u16(), message)),
        s => RemoteError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

/// Checks the status before decoding; error bodies need not be JSON.
fn read_body(status: StatusCode, text: &str) -> RemoteResult<Value> {
    if status.is_success() {
        return serde_json::from_str(text).map_err(|e| RemoteError::Decode(e.to_string()));
    }

    let message = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            let snippet: String = text.trim().chars().take(200).collect();
            if snippet.is_empty() {
                "no message".to_string()
            } else {
                snippet
            }
        });
    Err(status_error(status, message))
}

fn decode_schema(body: &Value) -> RemoteResult<(SchemaSnapshot, RawTypes)> {
    let properties = body
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| RemoteError::Decode("database without properties".into()))?;

    let mut snapshot = SchemaSnapshot::new();
    let mut raw = RawTypes::new();
    for (name, property) in properties {
        let raw_type = property
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Decode(format!("property '{}' has no type", name)))?;
        raw.insert(name.clone(), raw_type.to_string());

        let field_type = FieldType::from(raw_type);
        if field_type.is_enum() {
            let options = property
                .get(raw_type)
                .and_then(|p| p.get("options"))
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|o| o.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            snapshot.enum_options.insert(name.clone(), options);
        }
        snapshot.properties.insert(name.clone(), field_type);
    }
    Ok((snapshot, raw))
}

fn page_raw_types(page: &Value) -> RawTypes {
    page.get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter_map(|(name, p)| {
                    p.get("type")
                        .and_then(Value::as_str)
                        .map(|t| (name.clone(), t.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn decode_page(page: &Value) -> RemoteResult<Record> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Decode("page without id".into()))?
        .to_string();
    let collection_id = page
        .get("parent")
        .and_then(|p| p.get("database_id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut fields = FieldMap::new();
    if let Some(props) = page.get("properties").and_then(Value::as_object) {
        for (name, property) in props {
            fields.insert(name.clone(), decode_property(property));
        }
    }
    Ok(Record {
        id,
        collection_id,
        fields,
    })
}

fn plain_text(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn names(items: Option<&Value>, key: &str) -> Vec<String> {
    items
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|o| o.get(key).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn decode_property(property: &Value) -> FieldValue {
    let raw_type = property.get("type").and_then(Value::as_str).unwrap_or("");
    let inner = property.get(raw_type);
    let as_string = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    match raw_type {
        "title" => FieldValue::Title(plain_text(inner)),
        "rich_text" => FieldValue::Text(plain_text(inner)),
        "number" => FieldValue::Number(inner.and_then(Value::as_f64)),
        "date" => FieldValue::Date(as_string(inner.and_then(|d| d.get("start")))),
        "select" | "status" => FieldValue::SingleEnum(as_string(inner.and_then(|s| s.get("name")))),
        "multi_select" => FieldValue::MultiEnum(names(inner, "name")),
        "relation" => FieldValue::Relation(names(inner, "id")),
        "checkbox" => FieldValue::Checkbox(inner.and_then(Value::as_bool).unwrap_or(false)),
        "url" => FieldValue::Url(as_string(inner)),
        _ => FieldValue::Raw(inner.cloned().unwrap_or(Value::Null)),
    }
}

fn encode_properties(fields: &FieldMap, raw: &RawTypes) -> RemoteResult<Value> {
    let mut out = Map::new();
    for (name, value) in fields {
        let raw_type = raw
            .get(name)
            .map(String::as_str)
            .unwrap_or_else(|| default_raw_type(value));
        out.insert(name.clone(), encode_value(name, raw_type, value)?);
    }
    Ok(Value::Object(out))
}

fn default_raw_type(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Text(_) => "rich_text",
        FieldValue::SingleEnum(_) => "select",
        FieldValue::MultiEnum(_) => "multi_select",
        other => other.kind_name(),
    }
}

fn rich(text: &str) -> Value {
    json!([{ "type": "text", "text": { "content": text } }])
}

fn encode_value(name: &str, raw_type: &str, value: &FieldValue) -> RemoteResult<Value> {
    let encoded = match (raw_type, value) {
        ("title", FieldValue::Title(t)) => json!({ "title": rich(t) }),
        ("rich_text", FieldValue::Text(t)) => json!({ "rich_text": rich(t) }),
        ("number", FieldValue::Number(n)) => json!({ "number": n }),
        ("date", FieldValue::Date(d)) => {
            json!({ "date": d.as_ref().map(|start| json!({ "start": start })) })
        }
        (t @ ("select" | "status"), FieldValue::SingleEnum(o)) => {
            json!({ t: o.as_ref().map(|name| json!({ "name": name })) })
        }
        ("multi_select", FieldValue::MultiEnum(items)) => {
            let items: Vec<Value> = items.iter().map(|n| json!({ "name": n })).collect();
            json!({ "multi_select": items })
        }
        ("relation", FieldValue::Relation(ids)) => {
            let ids: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
            json!({ "relation": ids })
        }
        ("checkbox", FieldValue::Checkbox(b)) => json!({ "checkbox": b }),
        ("url", FieldValue::Url(u)) => json!({ "url": u }),
        (t, FieldValue::Raw(v)) => json!({ t: v }),
        (t, v) => {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!(
                    "cannot encode {} value for property '{}' of type {}",
                    v.kind_name(),
                    name,
                    t
                ),
            })
        }
    };
    Ok(encoded)
}

/// Server-side form of a filter, when Notion can express it.
///
/// Results are re-checked locally, so returning `None` only costs bandwidth.
fn encode_filter(filter: &RecordFilter, raw: &RawTypes) -> Option<Value> {
    match filter {
        RecordFilter::Equals { field, value } => {
            let raw_type = raw.get(field)?.as_str();
            match (raw_type, value) {
                (t @ ("select" | "status"), FieldValue::SingleEnum(Some(o))) => {
                    Some(json!({ "property": field, t: { "equals": o } }))
                }
                (t @ ("title" | "rich_text"), FieldValue::Title(s) | FieldValue::Text(s)) => {
                    Some(json!({ "property": field, t: { "equals": s } }))
                }
                ("number", FieldValue::Number(Some(n))) => {
                    Some(json!({ "property": field, "number": { "equals": n } }))
                }
                ("checkbox", FieldValue::Checkbox(b)) => {
                    Some(json!({ "property": field, "checkbox": { "equals": b } }))
                }
                ("multi_select", FieldValue::MultiEnum(items)) if !items.is_empty() => {
                    let parts: Vec<Value> = items
                        .iter()
                        .map(|o| json!({ "property": field, "multi_select": { "contains": o } }))
                        .collect();
                    Some(json!({ "and": parts }))
                }
                _ => None,
            }
        }
        RecordFilter::And { filters } => {
            let parts: Vec<Value> = filters
                .iter()
                .filter_map(|f| encode_filter(f, raw))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(json!({ "and": parts }))
            }
        }
    }
}
