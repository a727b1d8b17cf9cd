//! Schema-less wire-format decoder

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{hex_dump, WireError, WireField, WireType, WireValue, MAX_VARINT_LEN};

/// Outcome of decoding one payload
///
/// On error the fields decoded before the failure are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    /// At least one field and no error
    pub success: bool,
    /// Fields in wire order
    pub fields: Vec<WireField>,
    /// Why decoding stopped early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hex dump of the whole input
    pub hex_dump: String,
}

/// Decode a payload into its fields
///
/// Never panics; malformed input yields `success == false` and an error.
#[must_use]
pub fn decode(bytes: &[u8]) -> DecodeResult {
    let mut cursor = Cursor::new(bytes);
    let mut fields = Vec::new();
    let mut error = None;

    while !cursor.at_end() {
        match cursor.read_field() {
            Ok(field) => fields.push(field),
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
    }

    DecodeResult {
        success: error.is_none() && !fields.is_empty(),
        fields,
        error,
        hex_dump: hex_dump(bytes),
    }
}

/// Whether bytes decode completely into at least one field
fn is_message(bytes: &[u8]) -> bool {
    let mut cursor = Cursor::new(bytes);
    let mut count = 0usize;
    while !cursor.at_end() {
        if cursor.skip_field().is_err() {
            return false;
        }
        count += 1;
    }
    count > 0
}

/// Strict UTF-8 without control characters other than whitespace
fn as_text(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .then_some(text)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_varint(&mut self) -> Result<u64, WireError> {
        let start = self.pos;
        let mut value = 0u64;

        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(WireError::Truncated { offset: self.pos })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(WireError::VarintOverflow { offset: start })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(WireError::Truncated { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_tag(&mut self) -> Result<(u32, WireType), WireError> {
        let offset = self.pos;
        let tag = self.read_varint()?;

        let number = tag >> 3;
        let field_number = u32::try_from(number)
            .ok()
            .filter(|n| *n != 0)
            .ok_or(WireError::InvalidFieldNumber { number, offset })?;

        #[allow(clippy::cast_possible_truncation)]
        let bits = (tag & 0x7) as u8;
        let wire_type = WireType::from_bits(bits).ok_or(WireError::UnknownWireType {
            wire_type: bits,
            offset,
        })?;

        Ok((field_number, wire_type))
    }

    fn read_length(&mut self) -> Result<usize, WireError> {
        let offset = self.pos;
        let len = self.read_varint()?;
        usize::try_from(len).map_err(|_| WireError::Truncated { offset })
    }

    fn read_field(&mut self) -> Result<WireField, WireError> {
        let (field_number, wire_type) = self.read_tag()?;

        let value = match wire_type {
            WireType::Varint => WireValue::Varint(self.read_varint()?),
            WireType::Fixed64 => WireValue::Fixed64(hex::encode(self.take(8)?)),
            WireType::Fixed32 => {
                let raw = self.take(4)?;
                WireValue::Fixed32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                let raw = self.take(len)?;
                if let Some(text) = as_text(raw) {
                    WireValue::Text(text.to_string())
                } else if is_message(raw) {
                    WireValue::Message(Bytes::copy_from_slice(raw).into())
                } else {
                    WireValue::Bytes(Bytes::copy_from_slice(raw).into())
                }
            }
        };

        Ok(WireField {
            field_number,
            wire_type,
            value,
        })
    }

    /// Validate one field without classifying its value
    fn skip_field(&mut self) -> Result<(), WireError> {
        let (_, wire_type) = self.read_tag()?;
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.take(len)?;
            }
        }
        Ok(())
    }
}
