use dataloader_common::error::{DecodeError, PartialWrite, StoreError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Store,
}

/// Enumeration of errors that can happen while processing a single record.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to decode record: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to write record: {0}")]
    Store(#[from] PartialWrite),
}

impl RecordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordError::Decode(_) => ErrorKind::Decode,
            RecordError::Store(_) => ErrorKind::Store,
        }
    }
}

/// Enumeration of errors that stop the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("record at {topic}/{partition}@{offset} could not be loaded: {source}")]
    Record {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: RecordError,
    },
    #[error("failed to close the store: {0}")]
    Close(#[from] StoreError),
    #[error("the store close task failed: {0}")]
    CloseTask(#[from] tokio::task::JoinError),
}
