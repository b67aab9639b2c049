pub mod heap_page;

use crate::transaction::TransactionId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one table file. Assigned by whoever registers the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({})", self.0)
    }
}

/// Address of a page: the owning table plus the page's position in its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: u32) -> Self {
        Self {
            table_id,
            page_number,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({}, {})", self.table_id.0, self.page_number)
    }
}

/// An in-memory page managed by the buffer pool.
pub trait Page {
    fn page_id(&self) -> PageId;

    /// Serialized page image, exactly one page long.
    fn page_data(&self) -> Vec<u8>;

    /// The transaction that dirtied this page, if any.
    fn is_dirty(&self) -> Option<TransactionId>;

    fn mark_dirty(&mut self, tid: Option<TransactionId>);

    /// Page image as of the last read from (or write to) disk.
    fn before_image(&self) -> Bytes;

    /// Replace the before-image with the current contents.
    fn set_before_image(&mut self);
}

pub use heap_page::HeapPage;
