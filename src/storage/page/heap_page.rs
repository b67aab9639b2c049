use crate::access::{RecordId, Tuple, TupleDesc};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use crate::transaction::TransactionId;
use bytes::Bytes;
use std::sync::Arc;

// Layout: a header bitmap with one bit per slot (bit i lives in byte i / 8,
// least significant bit first), followed by the fixed-width tuple slots.
// Whatever is left at the end of the page is zero.

/// A page of fixed-width tuples belonging to one table.
#[derive(Debug)]
pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
    before_image: Bytes,
}

impl HeapPage {
    /// Parse a page image read from disk.
    pub fn new(pid: PageId, data: &[u8], desc: Arc<TupleDesc>) -> StorageResult<Self> {
        let page_size = data.len();
        let num_slots = Self::slots_per_page(page_size, &desc);
        let header_size = Self::header_size(num_slots);
        let tuple_size = desc.byte_size();

        if header_size + num_slots * tuple_size > page_size {
            return Err(StorageError::InvalidPageSize {
                expected: header_size + num_slots * tuple_size,
                actual: page_size,
            });
        }

        let header = data[..header_size].to_vec();
        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                tuples.push(None);
                continue;
            }
            let start = header_size + slot * tuple_size;
            let mut tuple = Tuple::parse(Arc::clone(&desc), &data[start..start + tuple_size])?;
            tuple.set_record_id(Some(RecordId::new(pid, slot as u16)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            pid,
            desc,
            page_size,
            header,
            tuples,
            dirtier: None,
            before_image: Bytes::copy_from_slice(data),
        })
    }

    /// Image of a page with no tuples.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// `floor(page_bits / (tuple_bits + 1))`: each tuple costs its bytes plus one header bit.
    pub fn slots_per_page(page_size: usize, desc: &TupleDesc) -> usize {
        let slots = (page_size * 8) / (desc.byte_size() * 8 + 1);
        slots.min(u16::MAX as usize)
    }

    fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_unused_slots(&self) -> usize {
        self.tuples.iter().filter(|slot| slot.is_none()).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.tuples.len() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    /// Store `tuple` in the first free slot and return its new location.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> StorageResult<RecordId> {
        if **tuple.desc() != *self.desc {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple schema [{}] does not match page schema [{}]",
                tuple.desc(),
                self.desc
            )));
        }

        let slot = self
            .tuples
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(StorageError::PageFull(self.pid))?;

        let record_id = RecordId::new(self.pid, slot as u16);
        tuple.set_record_id(Some(record_id));
        self.set_slot(slot, true);
        self.tuples[slot] = Some(tuple);

        Ok(record_id)
    }

    /// Free the slot `tuple` occupies on this page.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        let slot = record_id.tuple_number as usize;

        if record_id.page_id != self.pid || !self.is_slot_used(slot) {
            return Err(StorageError::TupleNotFound(record_id));
        }

        self.set_slot(slot, false);
        self.tuples[slot] = None;
        Ok(())
    }

    /// Stored tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }
}

impl Page for HeapPage {
    fn page_id(&self) -> PageId {
        self.pid
    }

    fn page_data(&self) -> Vec<u8> {
        let tuple_size = self.desc.byte_size();
        let mut data = Vec::with_capacity(self.page_size);
        data.extend_from_slice(&self.header);

        for slot in &self.tuples {
            match slot {
                Some(tuple) => tuple.serialize(&mut data),
                None => data.resize(data.len() + tuple_size, 0),
            }
        }

        data.resize(self.page_size, 0);
        data
    }

    fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtier
    }

    fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    fn before_image(&self) -> Bytes {
        self.before_image.clone()
    }

    fn set_before_image(&mut self) {
        self.before_image = Bytes::from(self.page_data());
    }
}
