use crate::access::scan::HeapFileIterator;
use crate::access::tuple::Tuple;
use crate::access::tuple_desc::TupleDesc;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::disk::{self, PageManager};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, Page, PageId, TableId};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Unordered collection of heap pages backing one table.
///
/// Page `n` of the table lives at byte offset `n * page_size` of the file.
/// The page size is fixed when the file is opened.
pub struct HeapFile {
    table_id: TableId,
    desc: Arc<TupleDesc>,
    path: PathBuf,
    page_size: usize,
    disk: Mutex<PageManager>,
}

impl HeapFile {
    /// Create an empty table file, truncating any existing one.
    pub fn create(path: &Path, table_id: TableId, desc: Arc<TupleDesc>) -> StorageResult<Self> {
        let page_size = disk::page_size();
        let disk = PageManager::create(path, page_size)?;
        Ok(Self::with_disk(path, table_id, desc, disk))
    }

    /// Open an existing table file, creating it if missing.
    pub fn open(path: &Path, table_id: TableId, desc: Arc<TupleDesc>) -> StorageResult<Self> {
        let page_size = disk::page_size();
        let disk = PageManager::open(path, page_size)?;
        Ok(Self::with_disk(path, table_id, desc, disk))
    }

    fn with_disk(path: &Path, table_id: TableId, desc: Arc<TupleDesc>, disk: PageManager) -> Self {
        Self {
            table_id,
            desc,
            path: path.to_path_buf(),
            page_size: disk.page_size(),
            disk: Mutex::new(disk),
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse one page straight from disk, bypassing any cache.
    pub fn read_page(&self, pid: PageId) -> StorageResult<HeapPage> {
        self.check_table(pid)?;
        let data = self.disk.lock().read_page(pid)?;
        HeapPage::new(pid, &data, Arc::clone(&self.desc))
    }

    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        self.write_page_data(page.page_id(), &page.page_data())
    }

    /// Write a raw page image at `pid`'s offset, extending the file if needed.
    pub fn write_page_data(&self, pid: PageId, data: &[u8]) -> StorageResult<()> {
        self.check_table(pid)?;
        self.disk.lock().write_page(pid, data)
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        self.disk.lock().num_pages()
    }

    fn check_table(&self, pid: PageId) -> StorageResult<()> {
        if pid.table_id != self.table_id {
            return Err(StorageError::UnknownTable(pid.table_id));
        }
        Ok(())
    }

    /// Reserve the next page number by appending an empty page.
    ///
    /// Counting and appending happen under one lock, so concurrent
    /// allocations always get distinct pages.
    fn allocate_page(&self) -> StorageResult<PageId> {
        let mut disk = self.disk.lock();
        let pid = PageId::new(self.table_id, disk.num_pages()?);
        disk.write_page(pid, &HeapPage::empty_page_data(self.page_size))?;
        debug!("{} appended {}", self.table_id, pid);
        Ok(pid)
    }

    /// Place `tuple` on the first page with a free slot, appending a page if
    /// every existing one is full. Returns the modified page.
    ///
    /// Pages are inspected under a shared lock; the chosen page is locked
    /// exclusively before it is changed. Shared locks this call took on full
    /// pages are given back.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        if **tuple.desc() != *self.desc {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple schema [{}] does not match table schema [{}]",
                tuple.desc(),
                self.desc
            )));
        }
        if HeapPage::slots_per_page(self.page_size, &self.desc) == 0 {
            return Err(StorageError::SchemaMismatch(format!(
                "{}-byte tuples do not fit on a {}-byte page",
                self.desc.byte_size(),
                self.page_size
            )));
        }

        for page_number in 0..self.num_pages()? {
            let pid = PageId::new(self.table_id, page_number);
            let newly_locked = !pool.holds_lock(tid, pid);

            let page = pool.fetch(tid, pid, LockMode::Shared)?;
            let has_room = page.read().num_unused_slots() > 0;
            if newly_locked {
                // Nothing read here matters to the transaction yet.
                pool.unsafe_release_page(tid, pid);
            }
            if !has_room {
                continue;
            }

            let page = pool.fetch(tid, pid, LockMode::Exclusive)?;
            let mut guard = page.write();
            if guard.num_unused_slots() == 0 {
                // Filled up while we were waiting for the exclusive lock.
                drop(guard);
                if newly_locked {
                    pool.unsafe_release_page(tid, pid);
                }
                continue;
            }
            guard.insert_tuple(tuple)?;
            drop(guard);
            return Ok(vec![page]);
        }

        loop {
            let pid = self.allocate_page()?;
            let page = pool.fetch(tid, pid, LockMode::Exclusive)?;
            let mut guard = page.write();
            if guard.num_unused_slots() == 0 {
                // Another inserter committed into it first.
                drop(guard);
                pool.unsafe_release_page(tid, pid);
                continue;
            }
            guard.insert_tuple(tuple)?;
            drop(guard);
            return Ok(vec![page]);
        }
    }

    /// Free the slot `tuple` occupies. Returns the modified page.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        if record_id.page_id.table_id != self.table_id {
            return Err(StorageError::TupleNotFound(record_id));
        }

        let page = pool.fetch(tid, record_id.page_id, LockMode::Exclusive)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Cursor over every tuple in the file, read through `pool` as `tid`.
    pub fn iter(self: &Arc<Self>, pool: &BufferPool, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator::new(Arc::clone(self), pool.clone(), tid)
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("table_id", &self.table_id)
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}
