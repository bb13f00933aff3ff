//! Desired channel subscriptions.
//!
//! The set records intent, not server acknowledgement: it survives
//! disconnects and is replayed in full on every open.

use std::collections::BTreeSet;

/// Channels the caller wants to receive events for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    channels: BTreeSet<String>,
}

impl SubscriptionSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a channel. Returns `false` if it was already present.
    pub fn insert(&mut self, channel: impl Into<String>) -> bool {
        self.channels.insert(channel.into())
    }

    /// Forget a channel. Returns `false` if it was not present.
    pub fn remove(&mut self, channel: &str) -> bool {
        self.channels.remove(channel)
    }

    /// Whether the channel is desired.
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Channels in stable (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    /// Owned copy of all channels.
    pub fn to_vec(&self) -> Vec<String> {
        self.channels.iter().cloned().collect()
    }

    /// Number of desired channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
