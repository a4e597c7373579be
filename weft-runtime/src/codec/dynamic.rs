use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use linkme::distributed_slice;
use parking_lot::RwLock;
use tracing::debug;

use super::envelope::PayloadBlob;
use super::mutator::{Mutator, Payload, SchemaMessage};
use super::CodecTag;
use crate::error::CodecError;

/// Every `#[schema_message]` type, collected at link time.
#[distributed_slice]
pub static SCHEMA_TYPES: [fn() -> SchemaRegistration] = [..];

type DynDecodeFn = fn(&[u8]) -> Result<Arc<dyn DynMessage>, CodecError>;

/// Name and decoder of one schema message type.
#[derive(Clone, Copy)]
pub struct SchemaRegistration {
    full_name: &'static str,
    decode: DynDecodeFn,
}

impl SchemaRegistration {
    pub fn of<T: SchemaMessage>() -> Self {
        Self {
            full_name: T::FULL_NAME,
            decode: decode_dyn::<T>,
        }
    }

    pub fn full_name(&self) -> &'static str {
        self.full_name
    }
}

impl fmt::Debug for SchemaRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistration")
            .field("full_name", &self.full_name)
            .finish()
    }
}

fn decode_dyn<T: SchemaMessage>(bytes: &[u8]) -> Result<Arc<dyn DynMessage>, CodecError> {
    let message: T = serde_json::from_slice(bytes)?;
    Ok(Arc::new(message))
}

/// Object-safe view on a [`SchemaMessage`].
pub trait DynMessage: Send + Sync + fmt::Debug + 'static {
    fn full_name(&self) -> &'static str;
    fn to_bytes(&self) -> Result<Vec<u8>, CodecError>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: SchemaMessage> DynMessage for T {
    fn full_name(&self) -> &'static str {
        T::FULL_NAME
    }

    fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolves schema message names to decoders at runtime.
///
/// Owned by the [`CodecRegistry`](super::CodecRegistry) of a runtime; tests build isolated
/// instances.
#[derive(Default)]
pub struct TypeRegistry {
    decoders: RwLock<HashMap<&'static str, DynDecodeFn>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-filled with every `#[schema_message]` type linked into the binary.
    pub fn with_linked_types() -> Self {
        let registry = Self::new();
        registry.add_linked_types();
        registry
    }

    pub fn add_linked_types(&self) {
        for register in SCHEMA_TYPES.iter() {
            self.add(register());
        }
        debug!(types = self.len(), "Loaded linked schema message types");
    }

    pub fn register<T: SchemaMessage>(&self) {
        self.add(SchemaRegistration::of::<T>());
    }

    pub fn add(&self, registration: SchemaRegistration) {
        self.decoders
            .write()
            .insert(registration.full_name, registration.decode);
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.decoders.read().contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.decoders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.read().is_empty()
    }

    /// Decode `bytes` as the message type registered under `full_name`.
    pub fn decode(&self, full_name: &str, bytes: &[u8]) -> Result<Arc<dyn DynMessage>, CodecError> {
        let decode = self
            .decoders
            .read()
            .get(full_name)
            .copied()
            .ok_or_else(|| CodecError::UnknownPayloadType {
                type_name: full_name.to_string(),
            })?;
        decode(bytes)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.read().keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

/// Holds any schema message. Channels of this type carry heterogeneous messages, and
/// the concrete type is looked up by name when a payload is decoded.
#[derive(Debug, Clone)]
pub struct AnyMessage {
    inner: Arc<dyn DynMessage>,
}

impl AnyMessage {
    pub fn new<T: SchemaMessage>(message: T) -> Self {
        Self {
            inner: Arc::new(message),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.full_name()
    }

    pub fn is<T: SchemaMessage>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    pub fn downcast_ref<T: SchemaMessage>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    pub fn message(&self) -> &dyn DynMessage {
        self.inner.as_ref()
    }
}

impl<T: SchemaMessage> From<T> for AnyMessage {
    fn from(message: T) -> Self {
        Self::new(message)
    }
}

fn encode_any(value: &AnyMessage) -> Result<PayloadBlob, CodecError> {
    let bytes = value.inner.to_bytes()?;
    Ok(PayloadBlob::new(value.type_name(), CodecTag::Schema, bytes))
}

fn decode_any(blob: &PayloadBlob, types: &TypeRegistry) -> Result<AnyMessage, CodecError> {
    blob.expect_tag(CodecTag::Schema)?;
    let inner = types.decode(blob.type_name(), blob.bytes())?;
    Ok(AnyMessage { inner })
}

impl Payload for AnyMessage {
    fn mutator() -> Mutator<Self> {
        Mutator::new(type_name::<AnyMessage>(), CodecTag::Any, encode_any, decode_any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::schema_mutator;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Battery {
        level: f32,
        charging: bool,
    }

    impl SchemaMessage for Battery {
        const FULL_NAME: &'static str = "test.Battery";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Location {
        lat: f64,
        lon: f64,
    }

    impl SchemaMessage for Location {
        const FULL_NAME: &'static str = "test.Location";
    }

    #[test]
    fn wildcard_decodes_registered_types() {
        let types = TypeRegistry::new();
        types.register::<Battery>();
        types.register::<Location>();

        let mutator = AnyMessage::mutator();
        let battery = Battery { level: 0.5, charging: true };
        let blob = mutator.encode(&AnyMessage::new(battery.clone())).unwrap();
        assert_eq!(blob.type_name(), "test.Battery");
        assert_eq!(blob.codec_tag(), CodecTag::Schema);

        let decoded = mutator.decode(&blob, &types).unwrap();
        assert!(decoded.is::<Battery>());
        assert_eq!(decoded.downcast_ref::<Battery>(), Some(&battery));
        assert!(decoded.downcast_ref::<Location>().is_none());
    }

    #[test]
    fn unknown_type_name_fails_explicitly() {
        let types = TypeRegistry::new();
        types.register::<Battery>();

        let blob = AnyMessage::mutator()
            .encode(&AnyMessage::new(Location { lat: 47.37, lon: 8.54 }))
            .unwrap();
        let err = AnyMessage::mutator().decode(&blob, &types).unwrap_err();
        match err {
            CodecError::UnknownPayloadType { type_name } => assert_eq!(type_name, "test.Location"),
            other => panic!("expected unknown payload type, got {other:?}"),
        }
    }

    #[test]
    fn concrete_schema_mutator_checks_the_name() {
        let blob = schema_mutator::<Battery>()
            .encode(&Battery { level: 1.0, charging: false })
            .unwrap();
        let err = schema_mutator::<Location>()
            .decode(&blob, &TypeRegistry::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }
}
