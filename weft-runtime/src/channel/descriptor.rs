use std::fmt;

use crate::codec::{CodecTag, Mutator, PayloadBlob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Publish,
    Subscribe,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Publish => f.write_str("publish"),
            Direction::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// What a module declared about a channel: who, which direction, which payload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    channel: String,
    owner: String,
    direction: Direction,
    payload_type_name: &'static str,
    codec_tag: CodecTag,
}

impl ChannelDescriptor {
    pub fn new<T>(
        channel: impl Into<String>,
        owner: impl Into<String>,
        direction: Direction,
        mutator: &Mutator<T>,
    ) -> Self {
        Self {
            channel: channel.into(),
            owner: owner.into(),
            direction,
            payload_type_name: mutator.type_name(),
            codec_tag: mutator.codec_tag(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn payload_type_name(&self) -> &'static str {
        self.payload_type_name
    }

    pub fn codec_tag(&self) -> CodecTag {
        self.codec_tag
    }

    /// Whether a payload on the wire can be decoded into this declaration's type.
    ///
    /// Schema declarations need the exact message name. A wildcard declaration takes any
    /// schema message. Every other shape matches on the tag alone, so an `i32` publisher
    /// can feed an `f64` subscriber.
    pub fn accepts(&self, payload: &PayloadBlob) -> bool {
        match self.codec_tag {
            CodecTag::Any => payload.codec_tag() == CodecTag::Schema,
            CodecTag::Schema => {
                payload.codec_tag() == CodecTag::Schema
                    && payload.type_name() == self.payload_type_name
            }
            tag => payload.codec_tag() == tag,
        }
    }

    /// Whether two declarations of a channel, possibly from different modules, agree on
    /// the payload shape.
    pub fn agrees_with(&self, other: &ChannelDescriptor) -> bool {
        if self.codec_tag != other.codec_tag {
            return false;
        }
        self.codec_tag != CodecTag::Schema || self.payload_type_name == other.payload_type_name
    }
}
