use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::buffer::BufferSender;
use crate::error::FetchError;
use crate::metrics_consts::{BUFFER_BLOCKED, RECORDS_FETCHED, RECORDS_SKIPPED_AT_FETCH};
use crate::shutdown::Shutdown;
use crate::types::RawRecord;

/// A client for the partitioned log the loader reads from.
#[async_trait]
pub trait LogConsumer: Send + 'static {
    /// Wait for the next record. `Ok(None)` means something was received but there is nothing to
    /// hand on, like an empty payload; the implementation has already reported it.
    async fn poll(&mut self) -> Result<Option<RawRecord>, FetchError>;

    /// Close the client. May block for as long as the client needs to leave its group.
    fn close(self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceExit {
    /// The client closed cleanly.
    Closed,
    /// A force request arrived before the client finished closing.
    Aborted,
}

/// Moves records from a [`LogConsumer`] into the record buffer until shutdown.
pub struct RecordSource<C> {
    consumer: C,
    buffer: BufferSender,
}

impl<C: LogConsumer> RecordSource<C> {
    pub fn new(consumer: C, buffer: BufferSender) -> Self {
        Self { consumer, buffer }
    }

    /// Run until a drain is requested or the pipeline drops its end of the buffer, then close the
    /// client. A fetch error returns immediately without closing anything.
    pub async fn run(mut self, shutdown: Shutdown) -> Result<SourceExit, FetchError> {
        info!("starting to listen to the log");

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.drain_requested() => {
                    info!("received interrupt signal; closing client");
                    break;
                }
                polled = self.consumer.poll() => polled?,
            };

            let Some(record) = polled else {
                metrics::counter!(RECORDS_SKIPPED_AT_FETCH).increment(1);
                continue;
            };

            metrics::counter!(RECORDS_FETCHED).increment(1);
            debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "fetched record"
            );

            if !push(&self.buffer, record, &shutdown).await {
                break;
            }
        }

        self.close(&shutdown).await
    }

    async fn close(self, shutdown: &Shutdown) -> Result<SourceExit, FetchError> {
        let consumer = self.consumer;
        let closing = tokio::task::spawn_blocking(move || consumer.close());

        match shutdown.unless_forced(closing).await {
            Some(_) => {
                info!("closed log client");
                Ok(SourceExit::Closed)
            }
            None => {
                warn!("received second interrupt signal; quitting without waiting for client close");
                Ok(SourceExit::Aborted)
            }
        }
    }
}

/// Hand a record to the pipeline, blocking while the buffer is full. Returns false if the source
/// should stop.
async fn push(buffer: &BufferSender, record: RawRecord, shutdown: &Shutdown) -> bool {
    let record = match buffer.try_send(record) {
        Ok(()) => return true,
        Err(TrySendError::Full(record)) => record,
        Err(TrySendError::Closed(_)) => {
            info!("pipeline stopped taking records; closing client");
            return false;
        }
    };

    warn!("record buffer full, waiting on the pipeline");
    metrics::counter!(BUFFER_BLOCKED).increment(1);

    let offset = record.offset;
    tokio::select! {
        biased;
        _ = shutdown.drain_requested() => {
            info!(offset, "received interrupt signal while blocked; closing client");
            false
        }
        sent = buffer.send(record) => match sent {
            Ok(()) => true,
            Err(_) => {
                info!("pipeline stopped taking records; closing client");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use rdkafka::error::{KafkaError, RDKafkaErrorCode};
    use tokio::sync::mpsc;

    use super::*;
    use crate::buffer::record_buffer;

    type Polled = Result<Option<RawRecord>, FetchError>;

    /// A log fed from a channel. Closing waits on `close_gate` when one is set.
    struct ChannelConsumer {
        records: mpsc::UnboundedReceiver<Polled>,
        close_gate: Option<std_mpsc::Receiver<()>>,
        closed: std_mpsc::Sender<()>,
    }

    #[async_trait]
    impl LogConsumer for ChannelConsumer {
        async fn poll(&mut self) -> Result<Option<RawRecord>, FetchError> {
            match self.records.recv().await {
                Some(polled) => polled,
                None => std::future::pending().await,
            }
        }

        fn close(self) {
            if let Some(gate) = self.close_gate {
                drop(gate.recv());
            }
            drop(self.closed.send(()));
        }
    }

    struct Harness {
        feed: mpsc::UnboundedSender<Polled>,
        closed: std_mpsc::Receiver<()>,
        consumer: ChannelConsumer,
    }

    fn harness(close_gate: Option<std_mpsc::Receiver<()>>) -> Harness {
        let (feed, records) = mpsc::unbounded_channel();
        let (closed_tx, closed) = std_mpsc::channel();
        Harness {
            feed,
            closed,
            consumer: ChannelConsumer {
                records,
                close_gate,
                closed: closed_tx,
            },
        }
    }

    fn record(offset: i64) -> RawRecord {
        RawRecord {
            payload: b"[]".to_vec(),
            topic: "reddit".to_owned(),
            partition: 0,
            offset,
        }
    }

    #[tokio::test]
    async fn test_forwards_records_in_order_and_skips_empty_polls() {
        let Harness {
            feed,
            closed,
            consumer,
        } = harness(None);
        let (tx, mut rx) = record_buffer(NonZeroUsize::new(10).unwrap());
        let shutdown = Shutdown::new();

        feed.send(Ok(Some(record(1)))).unwrap();
        feed.send(Ok(None)).unwrap();
        feed.send(Ok(Some(record(2)))).unwrap();

        let source = tokio::spawn(RecordSource::new(consumer, tx).run(shutdown.clone()));

        assert_eq!(rx.recv().await.unwrap().offset, 1);
        assert_eq!(rx.recv().await.unwrap().offset, 2);

        shutdown.request();
        let exit = source.await.unwrap().unwrap();

        assert_eq!(exit, SourceExit::Closed);
        assert!(closed.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_error_is_returned() {
        let Harness { feed, consumer, .. } = harness(None);
        let (tx, _rx) = record_buffer(NonZeroUsize::new(10).unwrap());

        feed.send(Err(FetchError::Kafka {
            topic: "reddit".to_owned(),
            source: KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure),
        }))
        .unwrap();

        let result = RecordSource::new(consumer, tx).run(Shutdown::new()).await;

        assert!(matches!(result, Err(FetchError::Kafka { .. })));
    }

    #[tokio::test]
    async fn test_blocks_when_buffer_is_full() {
        let Harness { feed, consumer, .. } = harness(None);
        let capacity = 3;
        let (tx, mut rx) = record_buffer(NonZeroUsize::new(capacity).unwrap());
        let shutdown = Shutdown::new();

        for offset in 0..10 {
            feed.send(Ok(Some(record(offset)))).unwrap();
        }

        let source = tokio::spawn(RecordSource::new(consumer, tx).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.get_inflight_records_count(), capacity);
        assert!(!source.is_finished());

        // Taking one record frees exactly one slot.
        assert_eq!(rx.recv().await.unwrap().offset, 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.get_inflight_records_count(), capacity);

        shutdown.request();
        let exit = tokio::time::timeout(Duration::from_secs(1), source)
            .await
            .expect("source did not stop while blocked on a full buffer")
            .unwrap()
            .unwrap();
        assert_eq!(exit, SourceExit::Closed);
    }

    #[tokio::test]
    async fn test_drain_while_blocked_keeps_the_held_record_out_of_the_buffer() {
        let Harness {
            feed,
            closed,
            consumer,
        } = harness(None);
        let (tx, mut rx) = record_buffer(NonZeroUsize::new(1).unwrap());
        let shutdown = Shutdown::new();

        feed.send(Ok(Some(record(0)))).unwrap();
        feed.send(Ok(Some(record(1)))).unwrap();

        let source = tokio::spawn(RecordSource::new(consumer, tx).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!source.is_finished(), "source should block on the full buffer");

        shutdown.request();
        let exit = tokio::time::timeout(Duration::from_secs(1), source)
            .await
            .expect("source did not observe the drain while blocked")
            .unwrap()
            .unwrap();

        assert_eq!(exit, SourceExit::Closed);
        assert!(closed.try_recv().is_ok());
        assert_eq!(rx.recv().await.unwrap().offset, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_pipeline_goes_away() {
        let Harness {
            feed,
            closed,
            consumer,
        } = harness(None);
        let (tx, rx) = record_buffer(NonZeroUsize::new(1).unwrap());
        drop(rx);

        feed.send(Ok(Some(record(0)))).unwrap();

        let exit = RecordSource::new(consumer, tx)
            .run(Shutdown::new())
            .await
            .unwrap();

        assert_eq!(exit, SourceExit::Closed);
        assert!(closed.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_second_request_abandons_a_stuck_close() {
        let (_gate_tx, gate_rx) = std_mpsc::channel::<()>();
        let Harness { consumer, .. } = harness(Some(gate_rx));
        let (tx, _rx) = record_buffer(NonZeroUsize::new(1).unwrap());
        let shutdown = Shutdown::new();

        let source = tokio::spawn(RecordSource::new(consumer, tx).run(shutdown.clone()));

        shutdown.request();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!source.is_finished());

        shutdown.request();
        let exit = tokio::time::timeout(Duration::from_secs(1), source)
            .await
            .expect("source kept waiting on the client close")
            .unwrap()
            .unwrap();

        assert_eq!(exit, SourceExit::Aborted);
    }
}
