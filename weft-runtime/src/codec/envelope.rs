use bytes::Bytes;
use chrono::{DateTime, Local, TimeZone};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::CodecTag;
use crate::error::CodecError;

/// Encoded payload: the concrete type name, its shape and the serialized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadBlob {
    type_name: String,
    codec_tag: CodecTag,
    bytes: Bytes,
}

impl PayloadBlob {
    pub fn new(type_name: impl Into<String>, codec_tag: CodecTag, bytes: impl Into<Bytes>) -> Self {
        Self {
            type_name: type_name.into(),
            codec_tag,
            bytes: bytes.into(),
        }
    }

    pub(crate) fn encode<V: Serialize + ?Sized>(
        type_name: impl Into<String>,
        codec_tag: CodecTag,
        value: &V,
    ) -> Result<Self, CodecError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(type_name, codec_tag, bytes))
    }

    pub(crate) fn decode_value<V: DeserializeOwned>(&self) -> Result<V, CodecError> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    pub(crate) fn expect_tag(&self, expected: CodecTag) -> Result<(), CodecError> {
        if self.codec_tag != expected {
            return Err(CodecError::TagMismatch {
                expected,
                found: self.codec_tag,
            });
        }
        Ok(())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn codec_tag(&self) -> CodecTag {
        self.codec_tag
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// The message shape that crosses module boundaries.
///
/// Built by publishers and handed to the router through the outgoing queue. Immutable
/// once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    source_module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_module: Option<String>,
    channel: String,
    unix_timestamp_ms: u64,
    sequence_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_user: Option<String>,
    payload: PayloadBlob,
}

impl WireEnvelope {
    pub fn new(
        source_module: impl Into<String>,
        channel: impl Into<String>,
        timestamp: DateTime<Local>,
        sequence_id: u64,
        payload: PayloadBlob,
    ) -> Self {
        Self {
            source_module: source_module.into(),
            target_module: None,
            channel: channel.into(),
            unix_timestamp_ms: u64::try_from(timestamp.timestamp_millis()).unwrap_or(0),
            sequence_id,
            target_user: None,
            source_user: None,
            payload,
        }
    }

    pub fn with_target_module(mut self, module: impl Into<String>) -> Self {
        self.target_module = Some(module.into());
        self
    }

    pub fn with_target_user(mut self, user: impl Into<String>) -> Self {
        self.target_user = Some(user.into());
        self
    }

    pub fn with_source_user(mut self, user: impl Into<String>) -> Self {
        self.source_user = Some(user.into());
        self
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    /// `None` for broadcasts.
    pub fn target_module(&self) -> Option<&str> {
        self.target_module.as_deref()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn unix_timestamp_ms(&self) -> u64 {
        self.unix_timestamp_ms
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        i64::try_from(self.unix_timestamp_ms)
            .ok()
            .and_then(|millis| Local.timestamp_millis_opt(millis).single())
            .unwrap_or_else(Local::now)
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn target_user(&self) -> Option<&str> {
        self.target_user.as_deref()
    }

    pub fn source_user(&self) -> Option<&str> {
        self.source_user.as_deref()
    }

    pub fn payload(&self) -> &PayloadBlob {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let timestamp = Local.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let payload = PayloadBlob::encode("f64", CodecTag::Number, &21.5).unwrap();
        let envelope = WireEnvelope::new("thermometer", "temperature", timestamp, 7, payload)
            .with_target_user("alice");

        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["source_module"], "thermometer");
        assert_eq!(json["channel"], "temperature");
        assert_eq!(json["unix_timestamp_ms"], 1_700_000_000_123u64);
        assert_eq!(json["target_user"], "alice");
        assert_eq!(json["payload"]["codec_tag"], "number");
        assert!(json.get("target_module").is_none());

        let back: WireEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.timestamp(), timestamp);
    }
}
