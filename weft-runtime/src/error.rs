use chrono::NaiveTime;
use thiserror::Error;

use crate::codec::CodecTag;

/// Errors raised while constructing a [`Schedule`](crate::Schedule).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cannot schedule a repeating function with an interval of zero")]
    ZeroInterval,

    #[error("interval of {millis}ms is out of range")]
    IntervalOutOfRange { millis: u128 },

    /// Start and stop of a daily window coincide, so the window is empty.
    #[error(
        "cannot schedule function which is only active during certain times of the day; \
         the provided start and stop time are equal at {at}"
    )]
    EmptyWindow { at: NaiveTime },

    #[error("invalid time window '{value}': {reason}")]
    InvalidWindow { value: String, reason: String },
}

/// Errors raised by the [`Dispatcher`](crate::Dispatcher) control surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("dispatcher '{name}' is already running")]
    AlreadyRunning { name: String },

    #[error("dispatcher '{name}' is not running")]
    NotRunning { name: String },

    #[error("dispatcher '{name}' terminated because a task panicked: {message}")]
    LoopPanicked { name: String, message: String },

    #[error("failed to spawn dispatcher thread '{name}': {reason}")]
    Spawn { name: String, reason: String },
}

/// Errors raised when converting between typed values and wire payloads.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The dynamic payload names a type this process never registered.
    #[error("unknown payload type '{type_name}': no schema message with this name is registered")]
    UnknownPayloadType { type_name: String },

    #[error("payload carries codec tag {found:?}, expected {expected:?}")]
    TagMismatch { expected: CodecTag, found: CodecTag },

    #[error("payload carries type '{found}', expected '{expected}'")]
    TypeMismatch { expected: String, found: String },

    #[error("value {value} does not fit into {target}")]
    OutOfRange { value: f64, target: &'static str },

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by channel handles and the channel registry.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error(
        "cannot {operation} channel '{channel}': publishing and subscribing is only allowed \
         during initialization"
    )]
    NotInitializing {
        channel: String,
        operation: &'static str,
    },

    #[error("channel '{channel}' was not published by this module, posting is not allowed")]
    NotWritable { channel: String },

    #[error("channel '{channel}' is invalid")]
    InvalidChannel { channel: String },

    #[error("module '{module}' is not active, channel '{channel}' can no longer be used")]
    ModuleInactive { module: String, channel: String },

    /// A module declared the same channel twice with different payload types.
    #[error(
        "module '{module}' declared channel '{channel}' with type '{existing}' before, \
         but now tried to {operation} it with type '{requested}'"
    )]
    TypeConflict {
        module: String,
        channel: String,
        existing: String,
        requested: String,
        operation: &'static str,
    },

    /// Two modules disagree on the payload type of a channel.
    #[error(
        "channel '{channel}' is declared with type '{first_type}' by module '{first_module}' \
         but with type '{second_type}' by module '{second_module}'"
    )]
    WiringConflict {
        channel: String,
        first_module: String,
        first_type: String,
        second_module: String,
        second_type: String,
    },

    #[error("outgoing queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised while reading module properties or loading configuration.
#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("property '{key}' is not set")]
    Missing { key: String },

    #[error("property '{key}' has invalid value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Errors surfaced by a module's lifecycle and its timer registrations.
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Raised through [`ModuleRef::fatal`](crate::ModuleRef::fatal); aborts the module.
    #[error("module '{module}' failed fatally: {message}")]
    Fatal { module: String, message: String },

    #[error("module '{module}' cannot {operation} while {state}")]
    InvalidState {
        module: String,
        operation: &'static str,
        state: String,
    },

    #[error("module '{module}' stopped before {phase} completed")]
    Aborted { module: String, phase: &'static str },

    #[error("a function named '{name}' is already registered")]
    DuplicateFunction { name: String },

    #[error("no function named '{name}' is registered")]
    UnknownFunction { name: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Property(#[from] PropertyError),
}
