use thiserror::Error;

/// Enumeration of errors raised while decoding a record payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload does not match the expected structure: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("element {index} has an empty natural key")]
    EmptyKey { index: usize },
    #[error("element {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("element {index} cannot be stored as a document: {source}")]
    Unencodable {
        index: usize,
        #[source]
        source: mongodb::bson::ser::Error,
    },
}

/// Enumeration of errors returned by a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
    #[error("a database error occurred: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

/// A store error together with how many documents were changed before it happened.
#[derive(Error, Debug)]
#[error("{source} ({affected} documents changed before the failure)")]
pub struct PartialWrite {
    pub affected: u64,
    #[source]
    pub source: StoreError,
}

/// Enumeration of fetch-level errors from the log client. None of these are recoverable.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to create kafka consumer: {0}")]
    Client(rdkafka::error::KafkaError),
    #[error("fetch error on topic {topic}: {source}")]
    Kafka {
        topic: String,
        #[source]
        source: rdkafka::error::KafkaError,
    },
}
