use async_trait::async_trait;
use mongodb::bson::{self, Document};
use tracing::debug;

use crate::error::{PartialWrite, StoreError};
use crate::types::{OpaqueRecord, RedditPost};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// What a single keyed upsert did to the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

impl UpsertOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// The primitives a document store has to offer the loader.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Replace the document in `collection` whose `key_field` equals `key` with `document`, or
    /// insert `document` if there is none. Fields missing from `document` do not survive.
    async fn upsert_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        document: Document,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Insert every document as a new entity. Returns how many were inserted.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>)
        -> Result<u64, StoreError>;

    async fn disconnect(&self) -> Result<(), StoreError>;
}

/// Upsert `posts` into `collection` by `post_id`, one at a time and in order.
///
/// Returns how many upserts changed stored state. Replaying the same posts reports 0. The first
/// failure stops the run, and the error carries the count of changes made up to that point.
pub async fn upsert_posts<S>(
    store: &S,
    posts: &[RedditPost],
    collection: &str,
) -> Result<u64, PartialWrite>
where
    S: DocumentStore + ?Sized,
{
    let mut affected = 0;

    for post in posts {
        let outcome = match bson::to_document(post) {
            Ok(document) => {
                store
                    .upsert_by_key(
                        collection,
                        RedditPost::KEY_FIELD,
                        post.natural_key(),
                        document,
                    )
                    .await
            }
            Err(e) => Err(StoreError::from(e)),
        };

        match outcome {
            Ok(outcome) => {
                debug!(post_id = %post.post_id, ?outcome, "upserted post");
                if outcome.changed() {
                    affected += 1;
                }
            }
            Err(source) => return Err(PartialWrite { affected, source }),
        }
    }

    Ok(affected)
}

/// Insert `records` into `collection` as a single batch. Not idempotent: every call creates new
/// documents. A failed batch reports 0 affected.
pub async fn insert_opaque<S>(
    store: &S,
    records: &[OpaqueRecord],
    collection: &str,
) -> Result<u64, PartialWrite>
where
    S: DocumentStore + ?Sized,
{
    if records.is_empty() {
        return Ok(0);
    }

    let documents = records.iter().map(|record| record.0.clone()).collect();

    store
        .insert_many(collection, documents)
        .await
        .map_err(|source| PartialWrite {
            affected: 0,
            source,
        })
}
