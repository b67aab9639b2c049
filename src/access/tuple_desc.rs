//! Table schemas.

use crate::access::value::FieldType;
use crate::storage::error::{StorageError, StorageResult};
use std::fmt;

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdItem {
    pub field_type: FieldType,
    pub field_name: String,
}

impl fmt::Display for TdItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.field_name, self.field_type)
    }
}

/// Ordered, fixed list of typed columns shared by every tuple of a table.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(types: &[FieldType], names: &[&str]) -> StorageResult<Self> {
        if types.len() != names.len() {
            return Err(StorageError::SchemaMismatch(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }
        let items = types
            .iter()
            .zip(names)
            .map(|(t, n)| TdItem {
                field_type: *t,
                field_name: n.to_string(),
            })
            .collect();
        Ok(Self { items })
    }

    /// Schema with anonymous columns.
    pub fn unnamed(types: &[FieldType]) -> Self {
        let items = types
            .iter()
            .map(|t| TdItem {
                field_type: *t,
                field_name: "unnamed".to_string(),
            })
            .collect();
        Self { items }
    }

    /// Concatenate two schemas, `a`'s columns first.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let mut items = a.items.clone();
        items.extend(b.items.iter().cloned());
        TupleDesc { items }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_name(&self, i: usize) -> StorageResult<&str> {
        self.item(i).map(|item| item.field_name.as_str())
    }

    pub fn field_type(&self, i: usize) -> StorageResult<FieldType> {
        self.item(i).map(|item| item.field_type)
    }

    /// Index of the first column called `name`.
    pub fn index_for_field_name(&self, name: &str) -> StorageResult<usize> {
        self.items
            .iter()
            .position(|item| item.field_name == name)
            .ok_or_else(|| StorageError::NoSuchField(name.to_string()))
    }

    /// Serialized width of one tuple.
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.width()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TdItem> {
        self.items.iter()
    }

    fn item(&self, i: usize) -> StorageResult<&TdItem> {
        self.items.get(i).ok_or(StorageError::FieldIndexOutOfRange {
            index: i,
            num_fields: self.items.len(),
        })
    }
}

/// Two schemas are equal when their column types match position by position;
/// names are ignored.
impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.items.iter().map(|item| item.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TupleDesc {
        TupleDesc::new(&[FieldType::Int, FieldType::Str], &["id", "name"]).unwrap()
    }

    #[test]
    fn test_lookup() -> StorageResult<()> {
        let desc = sample();
        assert_eq!(desc.num_fields(), 2);
        assert_eq!(desc.field_name(1)?, "name");
        assert_eq!(desc.field_type(0)?, FieldType::Int);
        assert_eq!(desc.index_for_field_name("name")?, 1);
        Ok(())
    }

    #[test]
    fn test_bad_lookups() {
        let desc = sample();
        assert!(matches!(
            desc.field_name(2),
            Err(StorageError::FieldIndexOutOfRange { index: 2, num_fields: 2 })
        ));
        assert!(matches!(
            desc.index_for_field_name("missing"),
            Err(StorageError::NoSuchField(_))
        ));
    }

    #[test]
    fn test_mismatched_names() {
        assert!(TupleDesc::new(&[FieldType::Int], &["a", "b"]).is_err());
    }

    #[test]
    fn test_byte_size() {
        assert_eq!(sample().byte_size(), 4 + 132);
        assert_eq!(TupleDesc::unnamed(&[FieldType::Int; 3]).byte_size(), 12);
    }

    #[test]
    fn test_merge() {
        let merged = TupleDesc::merge(&sample(), &TupleDesc::unnamed(&[FieldType::Int]));
        assert_eq!(merged.num_fields(), 3);
        assert_eq!(merged.field_name(2).unwrap(), "unnamed");
        assert_eq!(merged.byte_size(), sample().byte_size() + 4);
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = sample();
        let b = TupleDesc::unnamed(&[FieldType::Int, FieldType::Str]);
        let c = TupleDesc::unnamed(&[FieldType::Str, FieldType::Int]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "id(INT), name(STRING)");
    }
}
