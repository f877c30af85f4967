//! The loop that takes records off the buffer, decodes them and writes them to the store.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use dataloader_common::{
    buffer::BufferReceiver,
    converter::PayloadKind,
    metrics_consts::{
        DECODE_ERRORS, DOCUMENTS_AFFECTED, DOCUMENTS_PER_RECORD, RECORDS_PROCESSED,
        RECORDS_SKIPPED, RECORD_PROCESS_TIME, STORE_ERRORS,
    },
    shutdown::Shutdown,
    store::{insert_opaque, upsert_posts, DocumentStore},
    types::{Batch, RawRecord},
};
use tracing::{error, info, warn};

use crate::error::{ErrorKind, PipelineError, RecordError};

/// What happens to a record that cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failed record stops the pipeline.
    Fail,
    /// Records that fail to decode are logged and skipped. Store failures still stop the pipeline.
    SkipMalformed,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseFailurePolicyError(String);

impl fmt::Display for ParseFailurePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} is not a valid failure policy", self.0)
    }
}

impl std::error::Error for ParseFailurePolicyError {}

impl FromStr for FailurePolicy {
    type Err = ParseFailurePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "fail" => Ok(FailurePolicy::Fail),
            "skip_malformed" => Ok(FailurePolicy::SkipMalformed),
            invalid => Err(ParseFailurePolicyError(invalid.to_owned())),
        }
    }
}

/// The result of processing one record.
#[derive(Debug)]
pub struct ProcessingOutcome {
    pub records_affected: u64,
    pub error: Option<RecordError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// A drain was requested and the store closed.
    Drained,
    /// The record source went away and the store closed.
    SourceClosed,
    /// A force request arrived before the store finished closing.
    Aborted,
}

pub struct Pipeline<S> {
    store: Arc<S>,
    records: BufferReceiver,
    payload_kind: PayloadKind,
    failure_policy: FailurePolicy,
    collection: Option<String>,
}

impl<S: DocumentStore> Pipeline<S> {
    pub fn new(store: Arc<S>, records: BufferReceiver) -> Self {
        Self {
            store,
            records,
            payload_kind: PayloadKind::Posts,
            failure_policy: FailurePolicy::Fail,
            collection: None,
        }
    }

    pub fn payload_kind(mut self, payload_kind: PayloadKind) -> Self {
        self.payload_kind = payload_kind;
        self
    }

    pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Write every record to `collection` instead of a collection named after its topic.
    pub fn collection(mut self, collection: Option<String>) -> Self {
        self.collection = collection;
        self
    }

    /// Decode one record and write what it contains.
    pub async fn process(&self, record: &RawRecord) -> ProcessingOutcome {
        let collection = self.collection.as_deref().unwrap_or(&record.topic);

        let batch = match self.payload_kind.convert(&record.payload) {
            Ok(batch) => batch,
            Err(e) => {
                return ProcessingOutcome {
                    records_affected: 0,
                    error: Some(e.into()),
                }
            }
        };

        metrics::histogram!(DOCUMENTS_PER_RECORD).record(batch.len() as f64);

        let written = match &batch {
            Batch::Posts(posts) => upsert_posts(self.store.as_ref(), posts, collection).await,
            Batch::Opaque(records) => insert_opaque(self.store.as_ref(), records, collection).await,
        };

        match written {
            Ok(affected) => ProcessingOutcome {
                records_affected: affected,
                error: None,
            },
            Err(e) => ProcessingOutcome {
                records_affected: e.affected,
                error: Some(e.into()),
            },
        }
    }

    /// Process records until a drain is requested or the source goes away, then close the store.
    /// A record that cannot be loaded under the configured [`FailurePolicy`] ends the run with an
    /// error, leaving the store open. A force request ends the run with [`PipelineExit::Aborted`]
    /// whether it arrives while a record is in flight or while the store is closing.
    pub async fn run(mut self, shutdown: Shutdown) -> Result<PipelineExit, PipelineError> {
        info!("starting dataloader runtime");

        let exit = loop {
            let record = tokio::select! {
                biased;
                _ = shutdown.drain_requested() => {
                    info!(
                        buffered = self.records.get_inflight_records_count(),
                        "received interrupt signal; closing dataloader"
                    );
                    break PipelineExit::Drained;
                }
                record = self.records.recv() => match record {
                    Some(record) => record,
                    None => {
                        info!("record source closed; closing dataloader");
                        break PipelineExit::SourceClosed;
                    }
                },
            };

            // A drain lets the record in flight finish. A force abandons it with the store open.
            match shutdown.unless_forced(self.handle(record)).await {
                Some(handled) => handled?,
                None => {
                    warn!(
                        "received second interrupt signal; quitting without waiting for the record in flight"
                    );
                    return Ok(PipelineExit::Aborted);
                }
            }
        };

        self.close(exit, &shutdown).await
    }

    async fn handle(&self, record: RawRecord) -> Result<(), PipelineError> {
        let start = Instant::now();
        let outcome = self.process(&record).await;
        metrics::histogram!(RECORD_PROCESS_TIME).record(start.elapsed().as_secs_f64());
        metrics::counter!(DOCUMENTS_AFFECTED).increment(outcome.records_affected);

        let Some(error) = outcome.error else {
            metrics::counter!(RECORDS_PROCESSED).increment(1);
            info!(
                affected = outcome.records_affected,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "uploaded records"
            );
            return Ok(());
        };

        match error.kind() {
            ErrorKind::Decode => metrics::counter!(DECODE_ERRORS).increment(1),
            ErrorKind::Store => metrics::counter!(STORE_ERRORS).increment(1),
        }

        if error.kind() == ErrorKind::Decode && self.failure_policy == FailurePolicy::SkipMalformed
        {
            metrics::counter!(RECORDS_SKIPPED).increment(1);
            warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %error,
                "skipping malformed record"
            );
            return Ok(());
        }

        Err(PipelineError::Record {
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            source: error,
        })
    }

    async fn close(
        self,
        exit: PipelineExit,
        shutdown: &Shutdown,
    ) -> Result<PipelineExit, PipelineError> {
        // Let the source see we are gone if it is still pushing.
        drop(self.records);

        let store = self.store;
        let disconnect = tokio::spawn(async move { store.disconnect().await });

        match shutdown.unless_forced(disconnect).await {
            Some(closed) => {
                if let Err(e) = closed? {
                    error!(error = %e, "failed to close store");
                    return Err(e.into());
                }
                info!("closed store successfully");
                Ok(exit)
            }
            None => {
                warn!("received second interrupt signal; quitting without waiting for graceful close");
                Ok(PipelineExit::Aborted)
            }
        }
    }
}
