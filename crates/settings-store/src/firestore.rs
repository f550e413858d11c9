use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use credential_resolver::TokenProvider;
use reqwest::{StatusCode, Url};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::SettingsStore;

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings store backed by the Firestore REST API.
///
/// Authenticates with tokens minted for the resolved operator credential and
/// decodes Firestore's typed field values into plain JSON.
pub struct FirestoreSettingsStore {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenProvider>,
}

impl FirestoreSettingsStore {
    pub fn new(tokens: Arc<TokenProvider>, client: reqwest::Client) -> Result<Self, StoreError> {
        Self::with_base_url(tokens, client, DEFAULT_FIRESTORE_URL)
    }

    pub fn with_base_url(
        tokens: Arc<TokenProvider>,
        client: reqwest::Client,
        base_url: &str,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidReference(format!("base url: {e}")))?;
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url, StoreError> {
        for part in [collection, id] {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StoreError::InvalidReference(format!(
                    "'{part}' is not a valid path segment"
                )));
            }
        }

        let project = self.tokens.credential().project_id();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidReference("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                project,
                "databases",
                "(default)",
                "documents",
                collection,
                id,
            ]);
        Ok(url)
    }
}

#[async_trait]
impl SettingsStore for FirestoreSettingsStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let url = self.document_url(collection, id)?;
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(StoreError::Transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(collection, id, "settings document not found");
                Ok(None)
            }
            status if status.is_success() => {
                let body: Value = response.json().await.map_err(StoreError::Transport)?;
                let fields = match body.get("fields") {
                    Some(Value::Object(fields)) => decode_fields(fields)?,
                    Some(_) => return Err(StoreError::Decode("'fields' is not an object".into())),
                    None => Map::new(),
                };
                debug!(collection, id, fields = fields.len(), "settings document loaded");
                Ok(Some(Value::Object(fields)))
            }
            status => {
                if status == StatusCode::UNAUTHORIZED {
                    self.tokens.invalidate().await;
                }
                warn!(collection, id, status = status.as_u16(), "settings read rejected");
                Err(StoreError::Status {
                    status: status.as_u16(),
                })
            }
        }
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, StoreError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

/// Convert one typed Firestore value (`{"stringValue": "x"}` etc.) to JSON.
pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(StoreError::Decode("typed value must be a one-key object".into()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        // Int64 values travel as strings.
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(Number::from(n)))
                .map_err(|e| StoreError::Decode(format!("integerValue: {e}"))),
            Value::Number(_) => Ok(inner.clone()),
            _ => Err(StoreError::Decode("integerValue has unexpected type".into())),
        },
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => Ok(Value::Object(decode_fields(fields)?)),
            None => Ok(Value::Object(Map::new())),
            Some(_) => Err(StoreError::Decode("mapValue.fields is not an object".into())),
        },
        "arrayValue" => match inner.get("values") {
            Some(Value::Array(values)) => values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            None => Ok(Value::Array(Vec::new())),
            Some(_) => Err(StoreError::Decode("arrayValue.values is not an array".into())),
        },
        "geoPointValue" => Ok(inner.clone()),
        other => Err(StoreError::Decode(format!("unsupported value type '{other}'"))),
    }
}
