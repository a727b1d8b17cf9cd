//! Protobuf wire-format decoding without a schema
//!
//! Payloads are decoded into a flat list of [`WireField`]s. Length-delimited
//! values are classified as text, nested message or raw bytes by inspection.

mod decoder;
mod encoder;
mod hexdump;

pub use decoder::{decode, DecodeResult};
pub use encoder::encode;
pub use hexdump::hex_dump;

use std::ops::Deref;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Longest legal varint encoding
pub const MAX_VARINT_LEN: usize = 10;

/// Wire-level decoding and encoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Input ended in the middle of a value
    #[error("Truncated input at offset {offset}")]
    Truncated {
        /// Offset where more bytes were expected
        offset: usize,
    },

    /// Varint continued past ten bytes
    #[error("Varint too long at offset {offset}")]
    VarintOverflow {
        /// Offset of the varint
        offset: usize,
    },

    /// Field number zero or beyond 32 bits
    #[error("Invalid field number {number} at offset {offset}")]
    InvalidFieldNumber {
        /// Decoded field number
        number: u64,
        /// Offset of the tag
        offset: usize,
    },

    /// Wire type other than 0, 1, 2 or 5
    #[error("Unknown wire type {wire_type} at offset {offset}")]
    UnknownWireType {
        /// Raw wire type bits
        wire_type: u8,
        /// Offset of the tag
        offset: usize,
    },

    /// Fixed64 value that is not 16 hex digits
    #[error("Invalid fixed64 value: {0}")]
    InvalidFixed64(String),
}

/// Wire type carried in the low three bits of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireType {
    /// Type 0
    Varint,
    /// Type 1
    Fixed64,
    /// Type 2
    LengthDelimited,
    /// Type 5
    Fixed32,
}

impl WireType {
    /// Wire type for raw tag bits
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }

    /// Raw tag bits
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

/// Decoded value of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum WireValue {
    /// Unsigned varint
    Varint(u64),
    /// Raw eight bytes as 16 hex digits, in wire order
    Fixed64(String),
    /// Little-endian 32-bit value
    Fixed32(u32),
    /// Printable UTF-8 text
    Text(String),
    /// Opaque bytes
    Bytes(HexBytes),
    /// Bytes that decode completely as a nested message
    Message(HexBytes),
}

impl WireValue {
    /// Wire type used to encode this value
    #[must_use]
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::Fixed32(_) => WireType::Fixed32,
            Self::Text(_) | Self::Bytes(_) | Self::Message(_) => WireType::LengthDelimited,
        }
    }
}

/// One decoded field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireField {
    /// Field number (tag >> 3), never zero
    pub field_number: u32,
    /// Wire type (tag & 7)
    pub wire_type: WireType,
    /// Decoded value
    pub value: WireValue,
}

impl WireField {
    /// Build a field whose wire type follows its value
    #[must_use]
    pub fn new(field_number: u32, value: WireValue) -> Self {
        Self {
            field_number,
            wire_type: value.wire_type(),
            value,
        }
    }

    /// Decode a nested message value
    #[must_use]
    pub fn nested(&self) -> Option<DecodeResult> {
        match &self.value {
            WireValue::Message(bytes) => Some(decode(bytes)),
            _ => None,
        }
    }
}

/// Raw payload bytes, serialized as a lower-case hex string
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HexBytes(pub Bytes);

impl Deref for HexBytes {
    type Target = Bytes;

    fn deref(&self) -> &Bytes {
        &self.0
    }
}

impl From<Bytes> for HexBytes {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for HexBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text)
            .map(Self::from)
            .map_err(serde::de::Error::custom)
    }
}
