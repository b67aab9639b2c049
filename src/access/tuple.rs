use crate::access::tuple_desc::TupleDesc;
use crate::access::value::Field;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Location of a stored tuple: the page it lives on and its slot there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub tuple_number: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, tuple_number: u16) -> Self {
        Self {
            page_id,
            tuple_number,
        }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page, then by slot
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.tuple_number.cmp(&other.tuple_number),
            other => other,
        }
    }
}

/// A row. Its fields always match its schema in count and type.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Field>) -> StorageResult<Self> {
        if fields.len() != desc.num_fields() {
            return Err(StorageError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                desc.num_fields(),
                fields.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            check_type(&desc, i, field)?;
        }

        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn field(&self, i: usize) -> StorageResult<&Field> {
        self.fields.get(i).ok_or(StorageError::FieldIndexOutOfRange {
            index: i,
            num_fields: self.fields.len(),
        })
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> StorageResult<()> {
        check_type(&self.desc, i, &field)?;
        self.fields[i] = field;
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Where this tuple is stored; `None` until it is placed on a page.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Fixed-width encoding, `desc().byte_size()` bytes long.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            field.serialize(out);
        }
    }

    pub fn parse(desc: Arc<TupleDesc>, data: &[u8]) -> StorageResult<Self> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for item in desc.iter() {
            let width = item.field_type.width();
            if offset + width > data.len() {
                return Err(StorageError::SchemaMismatch(format!(
                    "tuple needs {} bytes, got {}",
                    desc.byte_size(),
                    data.len()
                )));
            }
            fields.push(Field::parse(item.field_type, &data[offset..offset + width])?);
            offset += width;
        }

        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }
}

/// Equality compares values only, not location.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|field| field.to_string()).collect();
        write!(f, "{}", parts.join("\t"))
    }
}

fn check_type(desc: &TupleDesc, i: usize, field: &Field) -> StorageResult<()> {
    let expected = desc.field_type(i)?;
    if field.field_type() != expected {
        return Err(StorageError::SchemaMismatch(format!(
            "field {} should be {}, got {}",
            i,
            expected,
            field.field_type()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::FieldType;
    use crate::storage::page::TableId;

    fn desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(&[FieldType::Int, FieldType::Str], &["id", "name"]).unwrap())
    }

    #[test]
    fn test_record_id_ordering() {
        let page1 = PageId::new(TableId(1), 1);
        let page2 = PageId::new(TableId(1), 2);

        let a = RecordId::new(page1, 5);
        let b = RecordId::new(page1, 10);
        let c = RecordId::new(page2, 3);

        assert!(a < b); // Same page, different slot
        assert!(b < c); // Different page
        assert_eq!(a, RecordId::new(page1, 5));
    }

    #[test]
    fn test_tuple_creation() -> StorageResult<()> {
        let tuple = Tuple::new(desc(), vec![Field::Int(1), Field::Str("a".into())])?;
        assert_eq!(tuple.field(0)?, &Field::Int(1));
        assert!(tuple.record_id().is_none());
        assert_eq!(tuple.to_string(), "1\ta");
        Ok(())
    }

    #[test]
    fn test_schema_violations() {
        assert!(Tuple::new(desc(), vec![Field::Int(1)]).is_err());
        assert!(Tuple::new(desc(), vec![Field::Str("a".into()), Field::Int(1)]).is_err());

        let mut tuple = Tuple::new(desc(), vec![Field::Int(1), Field::Str("a".into())]).unwrap();
        assert!(tuple.set_field(0, Field::Str("x".into())).is_err());
        assert!(tuple.set_field(5, Field::Int(1)).is_err());
        assert!(tuple.set_field(0, Field::Int(9)).is_ok());
        assert_eq!(tuple.field(0).unwrap(), &Field::Int(9));
    }

    #[test]
    fn test_serialized_width_matches_schema() -> StorageResult<()> {
        let tuple = Tuple::new(desc(), vec![Field::Int(42), Field::Str("bob".into())])?;
        let mut out = Vec::new();
        tuple.serialize(&mut out);
        assert_eq!(out.len(), desc().byte_size());

        let parsed = Tuple::parse(desc(), &out)?;
        assert_eq!(parsed, tuple);
        Ok(())
    }
}
