use chrono::{DateTime, Local};

/// A value received on a channel, with the metadata it was posted with.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData<T> {
    value: T,
    timestamp: DateTime<Local>,
    user_id: Option<String>,
    source_module: String,
    sequence_id: u64,
}

impl<T> ChannelData<T> {
    pub(crate) fn new(
        value: T,
        timestamp: DateTime<Local>,
        user_id: Option<String>,
        source_module: String,
        sequence_id: u64,
    ) -> Self {
        Self {
            value,
            timestamp,
            user_id,
            source_module,
            sequence_id,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Time the value was posted at, not the time it was received.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}
