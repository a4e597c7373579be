//! [`Payload`] impls for the built-in shapes.
//!
//! Integers travel as exact JSON integers and floats as `f64`. Any number decodes into any
//! width as long as it fits; integers additionally reject fractional values.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::dynamic::TypeRegistry;
use super::envelope::PayloadBlob;
use super::mutator::{Mutator, Payload};
use super::CodecTag;
use crate::error::CodecError;

/// A number as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Int(i64),
    UInt(u64),
    Float(f64),
}

trait Number: Copy + Send + Sync + 'static {
    fn to_wire(self) -> WireNumber;
    fn from_wire(value: WireNumber) -> Result<Self, CodecError>;
}

macro_rules! integer {
    ($wide:ty => $variant:ident: $($t:ty),* $(,)?) => {$(
        impl Number for $t {
            fn to_wire(self) -> WireNumber {
                WireNumber::$variant(self as $wide)
            }

            fn from_wire(value: WireNumber) -> Result<Self, CodecError> {
                let out_of_range = |value: f64| CodecError::OutOfRange { value, target: stringify!($t) };
                match value {
                    WireNumber::Int(v) => <$t>::try_from(v).map_err(|_| out_of_range(v as f64)),
                    WireNumber::UInt(v) => <$t>::try_from(v).map_err(|_| out_of_range(v as f64)),
                    // MAX + 1 is a power of two, so the upper bound is exact in f64.
                    WireNumber::Float(v) if !v.is_finite()
                        || v.fract() != 0.0
                        || v < <$t>::MIN as f64
                        || v >= <$t>::MAX as f64 + 1.0 => Err(out_of_range(v)),
                    WireNumber::Float(v) => Ok(v as $t),
                }
            }
        }
    )*};
}

integer!(i64 => Int: i8, i16, i32, i64, isize);
integer!(u64 => UInt: u8, u16, u32, u64, usize);

impl Number for f64 {
    fn to_wire(self) -> WireNumber {
        WireNumber::Float(self)
    }

    fn from_wire(value: WireNumber) -> Result<Self, CodecError> {
        Ok(match value {
            WireNumber::Int(v) => v as f64,
            WireNumber::UInt(v) => v as f64,
            WireNumber::Float(v) => v,
        })
    }
}

impl Number for f32 {
    fn to_wire(self) -> WireNumber {
        WireNumber::Float(f64::from(self))
    }

    fn from_wire(value: WireNumber) -> Result<Self, CodecError> {
        let value = f64::from_wire(value)?;
        if value.is_finite() && value.abs() > f64::from(f32::MAX) {
            return Err(CodecError::OutOfRange { value, target: "f32" });
        }
        Ok(value as f32)
    }
}

fn encode_number<N: Number>(value: &N) -> Result<PayloadBlob, CodecError> {
    PayloadBlob::encode(type_name::<N>(), CodecTag::Number, &value.to_wire())
}

fn decode_number<N: Number>(blob: &PayloadBlob, _: &TypeRegistry) -> Result<N, CodecError> {
    blob.expect_tag(CodecTag::Number)?;
    N::from_wire(blob.decode_value()?)
}

fn encode_number_array<N: Number>(values: &Vec<N>) -> Result<PayloadBlob, CodecError> {
    let raw: Vec<WireNumber> = values.iter().map(|v| v.to_wire()).collect();
    PayloadBlob::encode(type_name::<Vec<N>>(), CodecTag::NumberArray, &raw)
}

fn decode_number_array<N: Number>(blob: &PayloadBlob, _: &TypeRegistry) -> Result<Vec<N>, CodecError> {
    blob.expect_tag(CodecTag::NumberArray)?;
    let raw: Vec<WireNumber> = blob.decode_value()?;
    raw.into_iter().map(N::from_wire).collect()
}

fn encode_number_entries<'a, N: Number>(
    type_name: &'static str,
    entries: impl Iterator<Item = (&'a String, &'a N)>,
) -> Result<PayloadBlob, CodecError> {
    let raw: BTreeMap<&String, WireNumber> = entries.map(|(k, v)| (k, v.to_wire())).collect();
    PayloadBlob::encode(type_name, CodecTag::NumberMap, &raw)
}

fn encode_hash_number_map<N: Number>(values: &HashMap<String, N>) -> Result<PayloadBlob, CodecError> {
    encode_number_entries(type_name::<HashMap<String, N>>(), values.iter())
}

fn encode_btree_number_map<N: Number>(values: &BTreeMap<String, N>) -> Result<PayloadBlob, CodecError> {
    encode_number_entries(type_name::<BTreeMap<String, N>>(), values.iter())
}

fn decode_number_map<N, M>(blob: &PayloadBlob, _: &TypeRegistry) -> Result<M, CodecError>
where
    N: Number,
    M: FromIterator<(String, N)>,
{
    blob.expect_tag(CodecTag::NumberMap)?;
    let raw: BTreeMap<String, WireNumber> = blob.decode_value()?;
    raw.into_iter()
        .map(|(k, v)| N::from_wire(v).map(|v| (k, v)))
        .collect()
}

macro_rules! number_payload {
    ($($t:ty),* $(,)?) => {$(
        impl Payload for $t {
            fn mutator() -> Mutator<Self> {
                Mutator::new(type_name::<$t>(), CodecTag::Number, encode_number::<$t>, decode_number::<$t>)
            }
        }

        impl Payload for Vec<$t> {
            fn mutator() -> Mutator<Self> {
                Mutator::new(
                    type_name::<Vec<$t>>(),
                    CodecTag::NumberArray,
                    encode_number_array::<$t>,
                    decode_number_array::<$t>,
                )
            }
        }

        impl Payload for HashMap<String, $t> {
            fn mutator() -> Mutator<Self> {
                Mutator::new(
                    type_name::<HashMap<String, $t>>(),
                    CodecTag::NumberMap,
                    encode_hash_number_map::<$t>,
                    decode_number_map::<$t, HashMap<String, $t>>,
                )
            }
        }

        impl Payload for BTreeMap<String, $t> {
            fn mutator() -> Mutator<Self> {
                Mutator::new(
                    type_name::<BTreeMap<String, $t>>(),
                    CodecTag::NumberMap,
                    encode_btree_number_map::<$t>,
                    decode_number_map::<$t, BTreeMap<String, $t>>,
                )
            }
        }
    )*};
}

number_payload!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Shapes that serialize as themselves: bool, string, string array and string maps.
trait Plain: Serialize + serde::de::DeserializeOwned + Send + 'static {
    const TAG: CodecTag;
}

fn encode_plain<T: Plain>(value: &T) -> Result<PayloadBlob, CodecError> {
    PayloadBlob::encode(type_name::<T>(), T::TAG, value)
}

fn decode_plain<T: Plain>(blob: &PayloadBlob, _: &TypeRegistry) -> Result<T, CodecError> {
    blob.expect_tag(T::TAG)?;
    blob.decode_value()
}

macro_rules! plain_payload {
    ($($t:ty => $tag:expr),* $(,)?) => {$(
        impl Plain for $t {
            const TAG: CodecTag = $tag;
        }

        impl Payload for $t {
            fn mutator() -> Mutator<Self> {
                Mutator::new(type_name::<$t>(), $tag, encode_plain::<$t>, decode_plain::<$t>)
            }
        }
    )*};
}

plain_payload!(
    bool => CodecTag::Bool,
    String => CodecTag::String,
    Vec<String> => CodecTag::StringArray,
    HashMap<String, String> => CodecTag::StringMap,
    BTreeMap<String, String> => CodecTag::StringMap,
);
