use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Read-only key lookup against a document store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetch the document `id` in `collection` as plain JSON.
    ///
    /// `Ok(None)` means the document does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;
}

/// In-process store for local development and tests.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    documents: RwLock<HashMap<(String, String), Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: impl Into<String>, id: impl Into<String>, doc: Value) {
        self.documents
            .write()
            .await
            .insert((collection.into(), id.into()), doc);
    }

    pub fn with_document(
        collection: impl Into<String>,
        id: impl Into<String>,
        doc: Value,
    ) -> Self {
        let mut documents = HashMap::new();
        documents.insert((collection.into(), id.into()), doc);
        Self {
            documents: RwLock::new(documents),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }
}
