use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fmt;

/// Maximum payload length of a string field, in bytes.
pub const STRING_LEN: usize = 128;

/// Column types. Every type has a fixed on-page width.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int = 1,
    Str = 2,
}

impl FieldType {
    pub fn from_u8(value: u8) -> StorageResult<Self> {
        match value {
            1 => Ok(FieldType::Int),
            2 => Ok(FieldType::Str),
            _ => Err(StorageError::SchemaMismatch(format!(
                "Unknown field type: {}",
                value
            ))),
        }
    }

    /// Serialized width in bytes.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int => 4,
            // length prefix + padded payload
            FieldType::Str => 4 + STRING_LEN,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Str => write!(f, "STRING"),
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Append the fixed-width encoding of this field to `out`.
    ///
    /// Strings longer than [`STRING_LEN`] bytes are truncated.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(v) => {
                // Writing into a Vec cannot fail.
                let _ = out.write_i32::<BigEndian>(*v);
            }
            Field::Str(s) => {
                let bytes = truncate_utf8(s, STRING_LEN).as_bytes();
                let _ = out.write_u32::<BigEndian>(bytes.len() as u32);
                out.extend_from_slice(bytes);
                out.resize(out.len() + STRING_LEN - bytes.len(), 0);
            }
        }
    }

    /// Decode a field of type `field_type` from the front of `data`.
    pub fn parse(field_type: FieldType, data: &[u8]) -> StorageResult<Self> {
        if data.len() < field_type.width() {
            return Err(StorageError::SchemaMismatch(format!(
                "{} field needs {} bytes, got {}",
                field_type,
                field_type.width(),
                data.len()
            )));
        }

        match field_type {
            FieldType::Int => Ok(Field::Int(BigEndian::read_i32(&data[..4]))),
            FieldType::Str => {
                let len = (BigEndian::read_u32(&data[..4]) as usize).min(STRING_LEN);
                let s = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
                Ok(Field::Str(s))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
