use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::dynamic::TypeRegistry;
use super::envelope::PayloadBlob;
use super::CodecTag;
use crate::error::CodecError;

type EncodeFn<T> = fn(&T) -> Result<PayloadBlob, CodecError>;
type DecodeFn<T> = fn(&PayloadBlob, &TypeRegistry) -> Result<T, CodecError>;

/// Encoder/decoder pair for one payload type.
pub struct Mutator<T> {
    type_name: &'static str,
    codec_tag: CodecTag,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T> Mutator<T> {
    pub fn new(
        type_name: &'static str,
        codec_tag: CodecTag,
        encode: EncodeFn<T>,
        decode: DecodeFn<T>,
    ) -> Self {
        Self {
            type_name,
            codec_tag,
            encode,
            decode,
        }
    }

    /// Name recorded in channel declarations for this type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn codec_tag(&self) -> CodecTag {
        self.codec_tag
    }

    pub fn encode(&self, value: &T) -> Result<PayloadBlob, CodecError> {
        (self.encode)(value)
    }

    pub fn decode(&self, blob: &PayloadBlob, types: &TypeRegistry) -> Result<T, CodecError> {
        (self.decode)(blob, types)
    }
}

impl<T> Clone for Mutator<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Mutator<T> {}

impl<T> fmt::Debug for Mutator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutator")
            .field("type_name", &self.type_name)
            .field("codec_tag", &self.codec_tag)
            .finish()
    }
}

/// A type that can travel through a channel.
///
/// Implemented for the scalar, array and map shapes, for [`AnyMessage`](super::AnyMessage),
/// and for every `#[schema_message]` struct.
pub trait Payload: Sized + Send + 'static {
    fn mutator() -> Mutator<Self>;
}

/// A structured message identified by a stable, fully qualified name.
///
/// Usually implemented through `#[schema_message]`, which also registers the type for
/// dynamic decoding.
pub trait SchemaMessage:
    Serialize + DeserializeOwned + Send + Sync + fmt::Debug + 'static
{
    const FULL_NAME: &'static str;
}

pub fn schema_mutator<T: SchemaMessage>() -> Mutator<T> {
    Mutator::new(T::FULL_NAME, CodecTag::Schema, encode_schema::<T>, decode_schema::<T>)
}

fn encode_schema<T: SchemaMessage>(value: &T) -> Result<PayloadBlob, CodecError> {
    PayloadBlob::encode(T::FULL_NAME, CodecTag::Schema, value)
}

fn decode_schema<T: SchemaMessage>(blob: &PayloadBlob, _: &TypeRegistry) -> Result<T, CodecError> {
    blob.expect_tag(CodecTag::Schema)?;
    if blob.type_name() != T::FULL_NAME {
        return Err(CodecError::TypeMismatch {
            expected: T::FULL_NAME.to_string(),
            found: blob.type_name().to_string(),
        });
    }
    blob.decode_value()
}
