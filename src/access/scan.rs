//! Sequential scan over a heap file.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::sync::Arc;
use std::vec;

enum ScanState {
    Unopened,
    Positioned {
        page_number: u32,
        tuples: vec::IntoIter<Tuple>,
    },
    Exhausted,
}

/// Forward, restartable cursor over every tuple of a [`HeapFile`].
///
/// Pages are fetched with shared locks through the buffer pool as the cursor
/// reaches them. The locks stay with the transaction after [`close`](Self::close).
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: BufferPool,
    tid: TransactionId,
    state: ScanState,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, pool: BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            state: ScanState::Unopened,
        }
    }

    /// Position the cursor at the start of page 0.
    pub fn open(&mut self) -> StorageResult<()> {
        self.state = if self.file.num_pages()? == 0 {
            ScanState::Exhausted
        } else {
            self.load(0)?
        };
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, ScanState::Unopened)
    }

    fn load(&self, page_number: u32) -> StorageResult<ScanState> {
        let pid = PageId::new(self.file.table_id(), page_number);
        let page = self.pool.fetch(self.tid, pid, LockMode::Shared)?;
        let tuples: Vec<Tuple> = page.read().tuples().cloned().collect();
        Ok(ScanState::Positioned {
            page_number,
            tuples: tuples.into_iter(),
        })
    }

    /// True if another tuple is available. Always false before `open`.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        loop {
            let next_page = match &self.state {
                ScanState::Unopened | ScanState::Exhausted => return Ok(false),
                ScanState::Positioned {
                    page_number,
                    tuples,
                } => {
                    if !tuples.as_slice().is_empty() {
                        return Ok(true);
                    }
                    page_number + 1
                }
            };

            // Empty pages are skipped
            self.state = if next_page < self.file.num_pages()? {
                self.load(next_page)?
            } else {
                ScanState::Exhausted
            };
        }
    }

    /// Next tuple, or `None` once the file is exhausted or before `open`.
    pub fn read_next(&mut self) -> StorageResult<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        match &mut self.state {
            ScanState::Positioned { tuples, .. } => Ok(tuples.next()),
            _ => Ok(None),
        }
    }

    /// Start again from page 0.
    pub fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    /// Drop the cursor position. Page locks are kept.
    pub fn close(&mut self) {
        self.state = ScanState::Unopened;
    }
}

impl Iterator for HeapFileIterator {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}
