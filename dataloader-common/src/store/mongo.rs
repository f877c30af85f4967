use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    Client, Collection,
};
use tracing::info;

use super::{DocumentStore, UpsertOutcome};
use crate::error::StoreError;

/// A document store backed by a single MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: String,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;

        // Ping so a bad URI fails at startup instead of on the first record.
        client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await?;
        info!(database, "connected to mongodb");

        Ok(Self {
            client,
            database: database.to_owned(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.database).collection(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn upsert_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        document: Document,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut filter = Document::new();
        filter.insert(key_field, key);

        let result = self
            .collection(collection)
            .replace_one(filter, document)
            .upsert(true)
            .await?;

        // mongod does not count a replacement with an identical document as a modification.
        let outcome = if result.upserted_id.is_some() {
            UpsertOutcome::Inserted
        } else if result.modified_count > 0 {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Unchanged
        };

        Ok(outcome)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64, StoreError> {
        let result = self.collection(collection).insert_many(documents).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.client.clone().shutdown().await;
        info!("closed mongodb client");
        Ok(())
    }
}
