//! Bounded record handoff between the fetcher and the aggregator.
//!
//! Capacity is the only backpressure: a full channel stalls the producer's push,
//! which in turn stalls further page fetches. Both ends race every wait against
//! the shared [`CancellationToken`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::record::Record;

/// Why a push did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Token fired while waiting for capacity; the record was not enqueued
    Cancelled,
    /// Receiver dropped (consumer stopped)
    Closed,
}

/// Result of a cancellable receive
#[derive(Debug)]
pub enum Received {
    Record(Record),
    /// Sender closed and every buffered record has been delivered
    Closed,
    Cancelled,
}

#[derive(Debug, Default)]
struct Counters {
    pushed: AtomicU64,
    delivered: AtomicU64,
}

/// Snapshot of channel traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub pushed: u64,
    pub delivered: u64,
}

impl ChannelStats {
    /// Records enqueued but never handed to the consumer
    pub fn undelivered(&self) -> u64 {
        self.pushed.saturating_sub(self.delivered)
    }
}

/// Read-only view of channel counters, valid after both ends are gone
#[derive(Debug, Clone)]
pub struct ChannelMonitor(Arc<Counters>);

impl ChannelMonitor {
    pub fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            pushed: self.0.pushed.load(Ordering::Acquire),
            delivered: self.0.delivered.load(Ordering::Acquire),
        }
    }
}

/// Create a bounded SPSC record channel.
///
/// Capacity 1 is the closest equivalent of an unbuffered rendezvous handoff.
pub fn handoff(capacity: NonZeroUsize) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(capacity.get());
    let counters = Arc::new(Counters::default());
    (
        RecordSender {
            tx,
            counters: counters.clone(),
        },
        RecordReceiver { rx, counters },
    )
}

/// Producer end. Owned by exactly one fetcher; [`close`](RecordSender::close)
/// consumes it, so the channel can only be closed once.
#[derive(Debug)]
pub struct RecordSender {
    tx: mpsc::Sender<Record>,
    counters: Arc<Counters>,
}

impl RecordSender {
    /// Enqueue a record, waiting for capacity unless `cancel` fires first.
    ///
    /// Cancellation wins ties: an already-cancelled token never enqueues.
    pub async fn push(&self, record: Record, cancel: &CancellationToken) -> Result<(), PushError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PushError::Cancelled),
            sent = self.tx.send(record) => {
                sent.map_err(|_| PushError::Closed)?;
                self.counters.pushed.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    pub fn monitor(&self) -> ChannelMonitor {
        ChannelMonitor(self.counters.clone())
    }

    /// Signal "no more records" to the consumer
    pub fn close(self) {
        log::debug!(
            "handoff closed after {} records",
            self.counters.pushed.load(Ordering::Acquire)
        );
        drop(self.tx);
    }
}

/// Consumer end
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<Record>,
    counters: Arc<Counters>,
}

impl RecordReceiver {
    /// Wait for the next record, channel close, or cancellation (cancellation wins ties).
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Received {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Received::Cancelled,
            next = self.rx.recv() => match next {
                Some(record) => {
                    self.counters.delivered.fetch_add(1, Ordering::AcqRel);
                    Received::Record(record)
                }
                None => Received::Closed,
            },
        }
    }
}
