use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

/// A record as delivered by the log, before any decoding. Moved into the record buffer by the
/// source and dropped by the pipeline once processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub payload: Vec<u8>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A projection of a single Reddit post. `post_id` is the natural key: two posts sharing it in
/// the same collection are the same entity, and a later write replaces the earlier one.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct RedditPost {
    pub post_id: String,
    pub ups: i64,
    pub created_utc: f64,
    pub upvote_ratio: f64,
    pub comments: Vec<String>,
    pub source: String,
    pub subreddit: String,
    pub selftext: String,
    pub title: String,
}

impl RedditPost {
    pub const KEY_FIELD: &'static str = "post_id";

    pub fn natural_key(&self) -> &str {
        &self.post_id
    }
}

/// An arbitrary JSON object with no natural key, already encoded as a document. Inserting one
/// always creates a new document, so replaying the same record produces duplicates.
#[derive(Debug, PartialEq, Clone)]
pub struct OpaqueRecord(pub Document);

/// Everything decoded from one payload. Which variant a payload decodes to decides whether it is
/// written idempotently.
#[derive(Debug, PartialEq, Clone)]
pub enum Batch {
    Posts(Vec<RedditPost>),
    Opaque(Vec<OpaqueRecord>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Posts(posts) => posts.len(),
            Batch::Opaque(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
