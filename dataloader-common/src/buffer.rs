//! The bounded hand-off between the record source and the pipeline. When the buffer is full the
//! source blocks in [`BufferSender::send`], which is the only backpressure the loader has.
use std::num::NonZeroUsize;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::mpsc::{
    channel,
    error::{SendError, TrySendError},
    Receiver, Sender,
};

use crate::metrics_consts::BUFFER_DEPTH;
use crate::types::RawRecord;

#[derive(Clone, Debug)]
pub struct BufferSender {
    sender: Sender<RawRecord>,
    in_flight: Arc<AtomicUsize>,
}

#[derive(Debug)]
pub struct BufferReceiver {
    receiver: Receiver<RawRecord>,
    in_flight: Arc<AtomicUsize>,
}

pub fn record_buffer(capacity: NonZeroUsize) -> (BufferSender, BufferReceiver) {
    let (tx, rx) = channel(capacity.get());
    let counter = Arc::new(AtomicUsize::new(0));
    (
        BufferSender {
            sender: tx,
            in_flight: Arc::clone(&counter),
        },
        BufferReceiver {
            receiver: rx,
            in_flight: counter,
        },
    )
}

impl BufferSender {
    pub fn try_send(&self, record: RawRecord) -> Result<(), TrySendError<RawRecord>> {
        let res = self.sender.try_send(record);
        if res.is_ok() {
            self.record_push();
        }
        res
    }

    pub async fn send(&self, record: RawRecord) -> Result<(), SendError<RawRecord>> {
        let res = self.sender.send(record).await;
        if res.is_ok() {
            self.record_push();
        }
        res
    }

    fn record_push(&self) {
        let depth = self.in_flight.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        metrics::gauge!(BUFFER_DEPTH).set(depth as f64);
    }
}

impl BufferReceiver {
    /// Wait for the next record. Returns `None` once every sender is gone and the buffer is empty.
    pub async fn recv(&mut self) -> Option<RawRecord> {
        let res = self.receiver.recv().await;
        if res.is_some() {
            let depth = self.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            metrics::gauge!(BUFFER_DEPTH).set(depth as f64);
        }
        res
    }

    pub fn get_inflight_records_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64) -> RawRecord {
        RawRecord {
            payload: b"[]".to_vec(),
            topic: "reddit".to_owned(),
            partition: 0,
            offset,
        }
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let (tx, mut rx) = record_buffer(NonZeroUsize::new(2).unwrap());

        tx.try_send(record(0)).unwrap();
        tx.try_send(record(1)).unwrap();
        assert!(matches!(tx.try_send(record(2)), Err(TrySendError::Full(_))));
        assert_eq!(rx.get_inflight_records_count(), 2);

        assert_eq!(rx.recv().await.unwrap().offset, 0);
        assert_eq!(rx.get_inflight_records_count(), 1);

        tx.try_send(record(2)).unwrap();
        assert_eq!(rx.recv().await.unwrap().offset, 1);
        assert_eq!(rx.recv().await.unwrap().offset, 2);
    }

    #[tokio::test]
    async fn test_receiver_sees_close_after_draining() {
        let (tx, mut rx) = record_buffer(NonZeroUsize::new(4).unwrap());
        tx.send(record(7)).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().offset, 7);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_sender_sees_dropped_receiver() {
        let (tx, rx) = record_buffer(NonZeroUsize::new(1).unwrap());
        drop(rx);

        assert!(matches!(tx.try_send(record(0)), Err(TrySendError::Closed(_))));
    }
}
