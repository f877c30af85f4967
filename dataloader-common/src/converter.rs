//! Decoding of raw payloads into domain records. Everything in here is pure: no I/O, no state.
use std::fmt;
use std::str::FromStr;

use mongodb::bson;

use crate::error::DecodeError;
use crate::types::{Batch, OpaqueRecord, RedditPost};

/// What payloads on the consumed topic are expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A JSON array of posts, upserted by `post_id`.
    Posts,
    /// A JSON array of arbitrary objects, inserted as-is.
    Opaque,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParsePayloadKindError(String);

impl fmt::Display for ParsePayloadKindError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} is not a valid payload kind", self.0)
    }
}

impl std::error::Error for ParsePayloadKindError {}

impl FromStr for PayloadKind {
    type Err = ParsePayloadKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "posts" => Ok(PayloadKind::Posts),
            "opaque" => Ok(PayloadKind::Opaque),
            invalid => Err(ParsePayloadKindError(invalid.to_owned())),
        }
    }
}

impl PayloadKind {
    pub fn convert(&self, payload: &[u8]) -> Result<Batch, DecodeError> {
        match self {
            PayloadKind::Posts => convert_posts(payload).map(Batch::Posts),
            PayloadKind::Opaque => convert_opaque(payload).map(Batch::Opaque),
        }
    }
}

/// Decode a payload holding a JSON array of posts. Unknown fields, missing fields and type
/// mismatches all fail the whole payload.
pub fn convert_posts(payload: &[u8]) -> Result<Vec<RedditPost>, DecodeError> {
    let posts: Vec<RedditPost> = serde_json::from_slice(payload)?;

    if let Some(index) = posts.iter().position(|post| post.post_id.is_empty()) {
        return Err(DecodeError::EmptyKey { index });
    }

    Ok(posts)
}

/// Decode a payload holding a JSON array of objects. Objects BSON cannot represent, like integers
/// above `i64::MAX`, fail here rather than at the store.
pub fn convert_opaque(payload: &[u8]) -> Result<Vec<OpaqueRecord>, DecodeError> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(payload)?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            serde_json::Value::Object(map) => bson::to_document(&map)
                .map(OpaqueRecord)
                .map_err(|source| DecodeError::Unencodable { index, source }),
            _ => Err(DecodeError::NotAnObject { index }),
        })
        .collect()
}
