use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use tracing::trace;

use super::queue::OutgoingQueue;
use crate::codec::{Mutator, WireEnvelope};
use crate::error::ChannelError;

/// Encodes values of one channel and pushes them onto the outgoing queue.
pub struct Publisher<T> {
    module: String,
    channel: String,
    mutator: Mutator<T>,
    outgoing: OutgoingQueue,
    sequence: AtomicU64,
    source_user: Option<String>,
}

impl<T> Publisher<T> {
    pub(crate) fn new(
        module: impl Into<String>,
        channel: impl Into<String>,
        mutator: Mutator<T>,
        outgoing: OutgoingQueue,
    ) -> Self {
        Self {
            module: module.into(),
            channel: channel.into(),
            mutator,
            outgoing,
            sequence: AtomicU64::new(0),
            source_user: None,
        }
    }

    /// Stamp every envelope with the user this process acts for.
    pub(crate) fn with_source_user(mut self, user: Option<String>) -> Self {
        self.source_user = user;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Broadcast `value`, timestamped now.
    pub fn post(&self, value: &T) -> Result<(), ChannelError> {
        self.send(value, Local::now(), None, None)
    }

    pub fn post_at(&self, value: &T, timestamp: DateTime<Local>) -> Result<(), ChannelError> {
        self.send(value, timestamp, None, None)
    }

    /// Send `value` only to the subscribers of one module.
    pub fn post_to_module(&self, module: &str, value: &T) -> Result<(), ChannelError> {
        self.send(value, Local::now(), Some(module), None)
    }

    /// Tag `value` with a target user; routing decides who receives it.
    pub fn post_to_user(&self, user: &str, value: &T) -> Result<(), ChannelError> {
        self.send(value, Local::now(), None, Some(user))
    }

    fn send(
        &self,
        value: &T,
        timestamp: DateTime<Local>,
        target_module: Option<&str>,
        target_user: Option<&str>,
    ) -> Result<(), ChannelError> {
        let payload = self.mutator.encode(value)?;
        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut envelope =
            WireEnvelope::new(self.module.as_str(), self.channel.as_str(), timestamp, sequence_id, payload);
        if let Some(module) = target_module {
            envelope = envelope.with_target_module(module);
        }
        if let Some(user) = target_user {
            envelope = envelope.with_target_user(user);
        }
        if let Some(user) = &self.source_user {
            envelope = envelope.with_source_user(user.as_str());
        }

        trace!(module = %self.module, channel = %self.channel, sequence_id, "Posting value");
        self.outgoing.push(envelope)
    }
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("module", &self.module)
            .field("channel", &self.channel)
            .field("posted", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}
