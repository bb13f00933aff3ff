//! Offline operation queue.
//!
//! Subscription changes issued while the socket is not open are recorded
//! here and replayed in FIFO order once it opens. Entries are not
//! deduplicated: `subscribe(a)`, `unsubscribe(a)` while offline replays
//! both frames.

use std::collections::VecDeque;
use std::fmt;

use relay_core::frame::OutboundFrame;

/// Kind of deferred operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Send a `subscribe` frame.
    Subscribe,
    /// Send an `unsubscribe` frame.
    Unsubscribe,
}

/// A subscription change waiting for an open socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingOperation {
    /// What to send.
    pub operation: Operation,
    /// Target channel.
    pub channel: String,
}

impl PendingOperation {
    /// Deferred subscribe.
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            operation: Operation::Subscribe,
            channel: channel.into(),
        }
    }

    /// Deferred unsubscribe.
    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self {
            operation: Operation::Unsubscribe,
            channel: channel.into(),
        }
    }

    /// Wire frame this operation replays as.
    pub fn to_frame(&self) -> OutboundFrame {
        match self.operation {
            Operation::Subscribe => OutboundFrame::subscribe(&self.channel),
            Operation::Unsubscribe => OutboundFrame::unsubscribe(&self.channel),
        }
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.operation {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
        };
        write!(f, "{op}:{}", self.channel)
    }
}

/// FIFO of deferred subscription changes.
#[derive(Clone, Debug, Default)]
pub struct OfflineQueue {
    entries: VecDeque<PendingOperation>,
}

impl OfflineQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    pub fn push(&mut self, op: PendingOperation) {
        self.entries.push_back(op);
    }

    /// Remove and return everything, oldest first.
    ///
    /// The queue is empty afterwards whether or not the caller manages to
    /// send the entries.
    pub fn drain(&mut self) -> Vec<PendingOperation> {
        self.entries.drain(..).collect()
    }

    /// Entries in queue order, without removing them.
    pub fn snapshot(&self) -> Vec<PendingOperation> {
        self.entries.iter().cloned().collect()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
