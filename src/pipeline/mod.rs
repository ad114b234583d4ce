//! # Send pipelines
//!
//! All outbound traffic is serialized by two bounded queues, each drained by a dedicated
//! worker thread: [serial::SerialPipeline] towards the AT host and [socket::SocketPipeline]
//! towards the network. Producers never block, a full queue fails the enqueue right away.
//!
//! Both pipelines keep the same statistics: bytes currently queued and the number of failed
//! enqueue, dequeue and transmit attempts.
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub mod serial;
pub mod socket;

/// Errors when submitting an item
#[derive(Clone, Debug, PartialEq)]
pub enum QueueError {
    /// Queue is at capacity
    Full,

    /// Worker is gone
    Closed,

    /// Empty command or empty payload
    InvalidItem,
}

impl<T> From<crossbeam_channel::TrySendError<T>> for QueueError {
    fn from(error: crossbeam_channel::TrySendError<T>) -> Self {
        match error {
            crossbeam_channel::TrySendError::Full(_) => QueueError::Full,
            crossbeam_channel::TrySendError::Disconnected(_) => QueueError::Closed,
        }
    }
}

/// Point in time copy of [PipelineStats]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bytes enqueued but not drained yet
    pub queued_bytes: usize,

    /// Rejected enqueue attempts
    pub enqueue_failures: u32,

    /// Items dequeued which failed the recheck before transmission
    pub dequeue_failures: u32,

    /// Failed transmissions
    pub transmit_failures: u32,
}

/// Counters of a single pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    queued_bytes: AtomicUsize,
    enqueue_failures: AtomicU32,
    dequeue_failures: AtomicU32,
    transmit_failures: AtomicU32,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued_bytes: self.queued_bytes.load(Ordering::Acquire),
            enqueue_failures: self.enqueue_failures.load(Ordering::Relaxed),
            dequeue_failures: self.dequeue_failures.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add_queued(&self, length: usize) -> usize {
        self.queued_bytes.fetch_add(length, Ordering::AcqRel) + length
    }

    /// Reduces the queued byte count, clamped at zero
    pub(crate) fn release_queued(&self, length: usize) -> usize {
        let (Ok(previous) | Err(previous)) =
            self.queued_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(current.saturating_sub(length))
                });

        if previous < length {
            log::error!("Queue accounting mismatch: {} bytes queued, {} drained", previous, length);
            return 0;
        }

        previous - length
    }

    pub(crate) fn enqueue_failed(&self) -> u32 {
        self.enqueue_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn dequeue_failed(&self) -> u32 {
        self.dequeue_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn transmit_failed(&self) -> u32 {
        self.transmit_failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}
