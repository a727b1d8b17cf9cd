//! Wire-format encoder for decoded field lists

use super::{WireError, WireField, WireValue};

/// Encode fields back into wire bytes
///
/// # Errors
///
/// Returns error for field number zero or a fixed64 value that is not
/// 16 hex digits
pub fn encode(fields: &[WireField]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();

    for field in fields {
        if field.field_number == 0 {
            return Err(WireError::InvalidFieldNumber {
                number: 0,
                offset: out.len(),
            });
        }

        let tag = (u64::from(field.field_number) << 3) | u64::from(field.value.wire_type().bits());
        write_varint(&mut out, tag);

        match &field.value {
            WireValue::Varint(v) => write_varint(&mut out, *v),
            WireValue::Fixed64(text) => {
                let raw = hex::decode(text)
                    .ok()
                    .filter(|raw| raw.len() == 8)
                    .ok_or_else(|| WireError::InvalidFixed64(text.clone()))?;
                out.extend_from_slice(&raw);
            }
            WireValue::Fixed32(v) => out.extend_from_slice(&v.to_le_bytes()),
            WireValue::Text(text) => write_delimited(&mut out, text.as_bytes()),
            WireValue::Bytes(raw) | WireValue::Message(raw) => write_delimited(&mut out, raw),
        }
    }

    Ok(out)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn write_delimited(out: &mut Vec<u8>, raw: &[u8]) {
    write_varint(out, raw.len() as u64);
    out.extend_from_slice(raw);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_bytes() {
        let fields = vec![
            WireField::new(1, WireValue::Varint(150)),
            WireField::new(2, WireValue::Text("hi".to_string())),
        ];
        assert_eq!(
            encode(&fields).unwrap(),
            vec![0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i']
        );
    }

    #[test]
    fn test_encode_max_varint() {
        let bytes = encode(&[WireField::new(1, WireValue::Varint(u64::MAX))]).unwrap();
        // tag plus ten varint bytes
        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[10], 0x01);
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        assert!(encode(&[WireField::new(0, WireValue::Varint(1))]).is_err());
        let bad = WireField::new(1, WireValue::Fixed64("abc".to_string()));
        assert!(matches!(encode(&[bad]), Err(WireError::InvalidFixed64(_))));
    }
}
