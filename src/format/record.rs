//! Generic fixed-layout unpacker
//!
//! [`decode`] walks a [`Layout`] left to right over a byte buffer. Whatever
//! follows the last declared field is captured as the record's remainder, so
//! a decoded record always accounts for the whole input. A buffer that runs
//! out before the last declared field produces a best-effort record with a
//! [`StructuralMismatch`] attached instead of an error.

use crate::format::layout::{FieldType, Layout};
use std::fmt;

/// A single decoded primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Any of the integer primitives, widened
    Int(i64),
    /// Fixed-length byte array
    Bytes(Vec<u8>),
    /// Null-terminated byte array, cut at the first NUL
    Text(String),
}

impl FieldValue {
    /// Integer value, if this is an integer field
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            FieldValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Field count disagreement between a layout and what a buffer yielded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralMismatch {
    /// Declared fields plus the tail capture
    pub expected: usize,
    /// Fields actually produced, tail included
    pub produced: usize,
}

impl fmt::Display for StructuralMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} fields, decoded {}",
            self.expected, self.produced
        )
    }
}

/// Result of unpacking one layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord<'a> {
    layout: Layout,
    fields: Vec<(&'static str, FieldValue)>,
    remainder: &'a [u8],
    consumed: usize,
    error: Option<StructuralMismatch>,
}

impl<'a> DecodedRecord<'a> {
    /// Layout the record was decoded with
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Decoded fields in layout order
    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Integer field by name
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_i64)
    }

    /// Integer field by name, narrowed to `u32`
    ///
    /// Signed fields are reinterpreted bit for bit.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn u32(&self, name: &str) -> Option<u32> {
        self.int(name).map(|v| v as u32)
    }

    /// Integer field by name, narrowed to `u16`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn u16(&self, name: &str) -> Option<u16> {
        self.int(name).map(|v| v as u16)
    }

    /// Bytes following the last declared field
    pub fn remainder(&self) -> &'a [u8] {
        self.remainder
    }

    /// Bytes consumed by the declared fields
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Structural error, if the buffer did not cover the layout
    pub fn error(&self) -> Option<StructuralMismatch> {
        self.error
    }

    /// True when every declared field was decoded
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

fn read_field(ty: FieldType, bytes: &[u8]) -> FieldValue {
    match ty {
        FieldType::I8 => FieldValue::Int(i64::from(i8::from_le_bytes([bytes[0]]))),
        FieldType::U8 => FieldValue::Int(i64::from(bytes[0])),
        FieldType::I16 => FieldValue::Int(i64::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
        FieldType::U16 => FieldValue::Int(i64::from(u16::from_le_bytes([bytes[0], bytes[1]]))),
        FieldType::I32 => FieldValue::Int(i64::from(i32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        FieldType::U32 => FieldValue::Int(i64::from(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        FieldType::Bytes(_) => FieldValue::Bytes(bytes.to_vec()),
        FieldType::CStr(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            FieldValue::Text(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
    }
}

/// Unpack `buffer` according to `layout`
///
/// Never panics: every field read is preceded by a length check, and a short
/// buffer yields the fields that fit plus a [`StructuralMismatch`].
pub fn decode(layout: Layout, buffer: &[u8]) -> DecodedRecord<'_> {
    let mut fields = Vec::with_capacity(layout.len());
    let mut cursor = 0usize;

    for f in layout.fields() {
        let width = f.ty.width();
        let Some(bytes) = buffer.get(cursor..cursor + width) else {
            break;
        };
        fields.push((f.name, read_field(f.ty, bytes)));
        cursor += width;
    }

    // The tail capture only exists when every declared field was read.
    let complete = fields.len() == layout.len();
    let produced = fields.len() + usize::from(complete);
    let expected = layout.len() + 1;
    let error = (produced != expected).then_some(StructuralMismatch { expected, produced });

    DecodedRecord {
        layout,
        fields,
        remainder: &buffer[cursor..],
        consumed: cursor,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::layout::field;

    const HEADER: Layout = Layout::new(
        "test header",
        &[
            field("small", FieldType::I8),
            field("flags", FieldType::U16),
            field("count", FieldType::I32),
            field("tag", FieldType::CStr(4)),
        ],
    );

    #[test]
    fn test_decode_complete_record() {
        let buf = [0xFF, 0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF, b'a', b'b', 0, b'z', 9, 9];
        let rec = decode(HEADER, &buf);

        assert!(rec.is_complete());
        assert_eq!(rec.int("small"), Some(-1));
        assert_eq!(rec.int("flags"), Some(0x1234));
        assert_eq!(rec.int("count"), Some(-2));
        assert_eq!(rec.get("tag"), Some(&FieldValue::Text("ab".to_string())));
        assert_eq!(rec.consumed(), 11);
        assert_eq!(rec.remainder(), &[9, 9]);
    }

    #[test]
    fn test_decode_short_buffer() {
        let buf = [0x01, 0x02, 0x03, 0x04];
        let rec = decode(HEADER, &buf);

        assert_eq!(
            rec.error(),
            Some(StructuralMismatch {
                expected: 5,
                produced: 2
            })
        );
        assert_eq!(rec.int("flags"), Some(0x0302));
        assert!(rec.get("count").is_none());
        assert_eq!(rec.consumed(), 3);
        assert_eq!(rec.remainder(), &[0x04]);
    }

    #[test]
    fn test_decode_empty_buffer() {
        let rec = decode(HEADER, &[]);
        assert!(!rec.is_complete());
        assert!(rec.fields().is_empty());
        assert_eq!(rec.consumed(), 0);
    }

    #[test]
    fn test_unsigned_narrowing() {
        const LAYOUT: Layout = Layout::new("word", &[field("w", FieldType::U32)]);
        let rec = decode(LAYOUT, &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(rec.u32("w"), Some(u32::MAX));
        assert_eq!(rec.int("w"), Some(i64::from(u32::MAX)));
    }
}
