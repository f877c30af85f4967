use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard,
};

use async_trait::async_trait;
use mongodb::bson::Document;

use super::{DocumentStore, UpsertOutcome};
use crate::error::StoreError;

/// An in-process store with the same upsert semantics as MongoDB: a replacement with an
/// identical document is not a change. Writes fail once the store is disconnected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    disconnected: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock().get(collection).map_or(0, Vec::len)
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }

    pub fn find_by_key(&self, collection: &str, key_field: &str, key: &str) -> Option<Document> {
        self.lock()
            .get(collection)?
            .iter()
            .find(|document| matches_key(document, key_field, key))
            .cloned()
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is disconnected".to_owned()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Document>>> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn matches_key(document: &Document, key_field: &str, key: &str) -> bool {
    document.get_str(key_field).is_ok_and(|value| value == key)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        document: Document,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check_connected()?;
        let mut collections = self.lock();
        let documents = collections.entry(collection.to_owned()).or_default();

        match documents
            .iter()
            .position(|existing| matches_key(existing, key_field, key))
        {
            Some(index) if documents[index] == document => Ok(UpsertOutcome::Unchanged),
            Some(index) => {
                documents[index] = document;
                Ok(UpsertOutcome::Replaced)
            }
            None => {
                documents.push(document);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64, StoreError> {
        self.check_connected()?;
        let inserted = documents.len() as u64;
        self.lock()
            .entry(collection.to_owned())
            .or_default()
            .extend(documents);
        Ok(inserted)
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::*;

    #[tokio::test]
    async fn test_writes_fail_after_disconnect() {
        let store = MemoryStore::new();
        store
            .upsert_by_key("reddit", "post_id", "abc123", doc! { "post_id": "abc123" })
            .await
            .unwrap();

        store.disconnect().await.unwrap();

        let upsert = store
            .upsert_by_key("reddit", "post_id", "def456", doc! { "post_id": "def456" })
            .await;
        assert!(matches!(upsert, Err(StoreError::Unavailable(_))));
        let insert = store.insert_many("raw", vec![doc! { "a": 1 }]).await;
        assert!(matches!(insert, Err(StoreError::Unavailable(_))));

        // Reads still see what was written before.
        assert_eq!(store.count("reddit"), 1);
        assert_eq!(store.count("raw"), 0);
    }
}
