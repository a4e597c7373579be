//! Conversion between typed values and the generic wire payload.
//!
//! Every payload type selects exactly one [`Mutator`] through its [`Payload`] impl. The
//! shapes are closed: numbers, bools, strings, number and string arrays, number and
//! string maps, schema messages, and the dynamic [`AnyMessage`] wildcard.

mod dynamic;
mod envelope;
mod mutator;
mod payload;
mod registry;

use serde::{Deserialize, Serialize};

pub use dynamic::{AnyMessage, DynMessage, SchemaRegistration, TypeRegistry, SCHEMA_TYPES};
pub use envelope::{PayloadBlob, WireEnvelope};
pub use mutator::{schema_mutator, Mutator, Payload, SchemaMessage};
pub use registry::CodecRegistry;

/// Shape of a payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecTag {
    Number,
    Bool,
    String,
    NumberArray,
    StringArray,
    NumberMap,
    StringMap,
    /// A concrete schema message, identified by its full name.
    Schema,
    /// Any schema message. Only appears on channel declarations; payloads on the wire
    /// always carry [`CodecTag::Schema`] with the concrete name.
    Any,
}
