//! In-memory document store (for development and tests)

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::document::{self, Document, Filter};
use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

type Collections = BTreeMap<String, Vec<Document>>;

/// Process-local store. Contents are lost on restart.
pub struct MemoryDocumentStore {
    collections: RwLock<Collections>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: &str, mut doc: Document) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        document::stamp_new(&mut doc, &id, Utc::now());

        self.write()?
            .entry(collection.to_string())
            .or_default()
            .push(doc);

        Ok(id)
    }

    async fn get(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn list(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, collection: &str, filter: &Filter, patch: Document) -> Result<u64> {
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)));

        match target {
            Some(doc) => {
                document::apply_patch(doc, patch, Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn collections(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.read().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create("flame", doc(json!({"slug": "alex-sam-x1"})))
            .await
            .unwrap();

        let found = store
            .get("flame", &Filter::by_id(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["slug"], json!("alex-sam-x1"));
        assert_eq!(found[ID_FIELD], json!(id));
        assert!(found.contains_key(CREATED_AT_FIELD));
        assert!(found.contains_key(UPDATED_AT_FIELD));

        let missing = store
            .get("flame", &Filter::new().eq("slug", "nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_ignores_client_timestamps() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create(
                "flame",
                doc(json!({"created_at": "1999-01-01T00:00:00Z", "updated_at": "1999-01-01T00:00:00Z"})),
            )
            .await
            .unwrap();

        let found = store.get("flame", &Filter::by_id(&id)).await.unwrap().unwrap();
        assert_ne!(found[CREATED_AT_FIELD], json!("1999-01-01T00:00:00Z"));
        assert_ne!(found[UPDATED_AT_FIELD], json!("1999-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_list_filters_and_limits() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            let status = if i % 2 == 0 { "paid" } else { "unpaid" };
            store
                .create("flame", doc(json!({"n": i, "payment_status": status})))
                .await
                .unwrap();
        }

        let paid = store
            .list("flame", &Filter::new().eq("payment_status", "paid"), 100)
            .await
            .unwrap();
        assert_eq!(paid.len(), 3);
        assert_eq!(paid[0]["n"], json!(0));
        assert_eq!(paid[2]["n"], json!(4));

        let limited = store.list("flame", &Filter::new(), 2).await.unwrap();
        assert_eq!(limited.len(), 2);

        let other = store.list("reply", &Filter::new(), 10).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_update_first_match_only() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create("flame", doc(json!({"payment_status": "unpaid"})))
            .await
            .unwrap();

        let updated = store
            .update("flame", &Filter::by_id(&id), doc(json!({"payment_status": "paid"})))
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let found = store.get("flame", &Filter::by_id(&id)).await.unwrap().unwrap();
        assert_eq!(found["payment_status"], json!("paid"));

        let none = store
            .update("flame", &Filter::by_id("missing"), doc(json!({"payment_status": "paid"})))
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_collections_lists_non_empty() {
        let store = MemoryDocumentStore::new();
        store.create("flame", Document::new()).await.unwrap();
        store.create("flame_reply", Document::new()).await.unwrap();

        assert_eq!(store.collections().await.unwrap(), vec!["flame", "flame_reply"]);
        assert!(store.ping().await.is_ok());
    }
}
