use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::dynamic::TypeRegistry;
use super::envelope::PayloadBlob;
use super::mutator::{Mutator, Payload};
use crate::error::CodecError;

/// Process-scoped cache of mutators, plus the schema type registry used for dynamic decoding.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    mutators: RwLock<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
    types: TypeRegistry,
}

impl CodecRegistry {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            mutators: RwLock::new(HashMap::new()),
            types,
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The mutator for `T`, created on first use.
    pub fn mutator<T: Payload>(&self) -> Mutator<T> {
        let key = type_name::<T>();
        if let Some(mutator) = self.cached::<T>(key) {
            return mutator;
        }

        let mut mutators = self.mutators.write();
        let entry = mutators
            .entry(key)
            .or_insert_with(|| Arc::new(T::mutator()) as Arc<dyn Any + Send + Sync>);
        entry.downcast_ref::<Mutator<T>>().copied().unwrap_or_else(T::mutator)
    }

    fn cached<T: Payload>(&self, key: &'static str) -> Option<Mutator<T>> {
        self.mutators
            .read()
            .get(key)
            .and_then(|mutator| mutator.downcast_ref::<Mutator<T>>().copied())
    }

    pub fn encode<T: Payload>(&self, value: &T) -> Result<PayloadBlob, CodecError> {
        self.mutator::<T>().encode(value)
    }

    pub fn decode<T: Payload>(&self, blob: &PayloadBlob) -> Result<T, CodecError> {
        self.mutator::<T>().decode(blob, &self.types)
    }

    pub fn cached_types(&self) -> usize {
        self.mutators.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AnyMessage, CodecTag, SchemaMessage};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Heartbeat {
        beats: u32,
    }

    impl SchemaMessage for Heartbeat {
        const FULL_NAME: &'static str = "test.Heartbeat";
    }

    #[test]
    fn mutators_are_cached_per_type() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.mutator::<f64>().codec_tag(), CodecTag::Number);
        assert_eq!(registry.mutator::<f64>().codec_tag(), CodecTag::Number);
        assert_eq!(registry.mutator::<Vec<String>>().codec_tag(), CodecTag::StringArray);
        assert_eq!(registry.cached_types(), 2);
    }

    #[test]
    fn dynamic_decoding_uses_the_owned_type_registry() {
        let types = TypeRegistry::new();
        types.register::<Heartbeat>();
        let registry = CodecRegistry::new(types);

        let blob = registry.encode(&AnyMessage::new(Heartbeat { beats: 72 })).unwrap();
        let decoded: AnyMessage = registry.decode(&blob).unwrap();
        assert_eq!(decoded.downcast_ref::<Heartbeat>(), Some(&Heartbeat { beats: 72 }));

        let isolated = CodecRegistry::default();
        assert!(isolated.decode::<AnyMessage>(&blob).is_err());
    }
}
