//! Buffer pool: page cache with integrated page locking and transaction
//! coordination.
//!
//! Every page access goes through [`BufferPool::fetch`], which first takes the
//! requested lock on behalf of the transaction and then returns the cached
//! page, reading it from the owning heap file on a miss.
//!
//! The pool follows a no-steal / force-at-commit policy: pages dirtied by a
//! running transaction are never written back before it commits, and eviction
//! only ever removes clean pages. Commit writes every page the transaction
//! dirtied; abort throws those pages away and re-reads them from disk.

pub mod lru;

use crate::access::{HeapFile, Tuple};
use crate::concurrency::lock::{LockManager, LockMode};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, Page, PageId, TableId};
use crate::storage::wal::LogFile;
use crate::transaction::TransactionId;
use dashmap::DashMap;
use log::{debug, warn};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a cached page.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Default number of cached pages.
pub const DEFAULT_NUM_PAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Maximum number of pages kept in memory. May be exceeded when every
    /// cached page is dirty.
    pub num_pages: usize,
    /// Lower bound of the per-call lock wait.
    pub lock_timeout_min: Duration,
    /// Upper bound (exclusive) of the per-call lock wait.
    pub lock_timeout_max: Duration,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_pages: DEFAULT_NUM_PAGES,
            lock_timeout_min: Duration::from_millis(1000),
            lock_timeout_max: Duration::from_millis(2000),
        }
    }
}

impl BufferPoolConfig {
    pub fn with_num_pages(mut self, num_pages: usize) -> Self {
        self.num_pages = num_pages;
        self
    }

    pub fn with_lock_timeout(mut self, min: Duration, max: Duration) -> Self {
        self.lock_timeout_min = min;
        self.lock_timeout_max = max;
        self
    }
}

#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    cache: Mutex<LruCache<PageId, PageRef>>,
    lock_manager: LockManager,
    files: DashMap<TableId, Arc<HeapFile>>,
    log: Arc<dyn LogFile>,
    config: BufferPoolConfig,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig, log: Arc<dyn LogFile>) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                cache: Mutex::new(LruCache::new(config.num_pages)),
                lock_manager: LockManager::new(),
                files: DashMap::new(),
                log,
                config,
            }),
        }
    }

    /// Make a table's heap file reachable through this pool.
    pub fn register_file(&self, file: Arc<HeapFile>) {
        self.inner.files.insert(file.table_id(), file);
    }

    pub fn file(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.inner
            .files
            .get(&table_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::UnknownTable(table_id))
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.num_pages
    }

    pub fn num_cached(&self) -> usize {
        self.inner.cache.lock().len()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    /// Lock `pid` in `mode` for `tid` and return the page.
    ///
    /// Waits for the lock for a random duration drawn once per call from the
    /// configured window. Running out of time yields
    /// [`StorageError::TransactionAborted`]; the caller is expected to abort
    /// the transaction.
    pub fn fetch(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> StorageResult<PageRef> {
        let timeout = self.lock_timeout();
        if !self.inner.lock_manager.acquire(tid, pid, mode, timeout) {
            debug!(
                "{} gave up waiting for {:?} on {} after {:?}",
                tid, mode, pid, timeout
            );
            return Err(StorageError::TransactionAborted { tid, page_id: pid });
        }

        let mut cache = self.inner.cache.lock();
        if let Some(page) = cache.get(&pid) {
            return Ok(Arc::clone(page));
        }

        let file = self.file(pid.table_id)?;
        let page: PageRef = Arc::new(RwLock::new(file.read_page(pid)?));
        Self::install(&mut cache, pid, Arc::clone(&page));
        Ok(page)
    }

    fn lock_timeout(&self) -> Duration {
        let min = self.inner.config.lock_timeout_min.as_millis() as u64;
        let max = self.inner.config.lock_timeout_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }

    /// Put `page` in the cache, evicting first if a new entry would overflow it.
    fn install(cache: &mut LruCache<PageId, PageRef>, pid: PageId, page: PageRef) {
        if !cache.contains(&pid) && cache.is_full() {
            Self::evict(cache);
        }
        cache.put(pid, page);
    }

    /// Drop the least recently used clean page. Dirty pages are never
    /// evicted; when nothing is clean the cache grows past its capacity.
    fn evict(cache: &mut LruCache<PageId, PageRef>) {
        // A page that is write-locked right now is being modified.
        let victim = cache.evict_where(|p| p.try_read().is_some_and(|p| p.is_dirty().is_none()));

        match victim {
            Some((pid, _)) => debug!("evicted {}", pid),
            None => warn!(
                "all {} cached pages are dirty, growing past capacity {}",
                cache.len(),
                cache.capacity()
            ),
        }
    }

    /// Add `tuple` to table `table_id` on behalf of `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> StorageResult<()> {
        let file = self.file(table_id)?;
        let modified = file.insert_tuple(self, tid, tuple)?;
        self.mark_modified(tid, modified);
        Ok(())
    }

    /// Remove `tuple` from the page its record id points at.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        let file = self.file(record_id.page_id.table_id)?;
        let modified = file.delete_tuple(self, tid, tuple)?;
        self.mark_modified(tid, modified);
        Ok(())
    }

    fn mark_modified(&self, tid: TransactionId, pages: Vec<PageRef>) {
        for page in pages {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.page_id()
            };
            // The page may have been evicted between the change and the dirty mark.
            Self::install(&mut self.inner.cache.lock(), pid, page);
        }
    }

    /// Cached pages currently dirtied by `tid`.
    fn dirty_pages(&self, tid: TransactionId) -> Vec<(PageId, PageRef)> {
        let cache = self.inner.cache.lock();
        cache
            .iter()
            .filter(|(_, page)| page.read().is_dirty() == Some(tid))
            .map(|(pid, page)| (*pid, Arc::clone(page)))
            .collect()
    }

    /// Write every dirty page of `tid` and release its locks.
    ///
    /// A failed write leaves the remaining pages dirty and the locks held, so
    /// the caller can still abort.
    pub fn commit(&self, tid: TransactionId) -> StorageResult<()> {
        let dirty = self.dirty_pages(tid);
        for (pid, page) in &dirty {
            self.write_back(*pid, page)?;
        }
        self.inner.lock_manager.release_all(tid);
        debug!("{} committed, {} page(s) written", tid, dirty.len());
        Ok(())
    }

    /// Throw away every page `tid` dirtied, restore it from disk and release
    /// the transaction's locks.
    pub fn abort(&self, tid: TransactionId) -> StorageResult<()> {
        let dirty = self.dirty_pages(tid);
        let mut first_error = None;

        for (pid, _) in &dirty {
            let mut cache = self.inner.cache.lock();
            cache.remove(pid);

            let reloaded = self
                .file(pid.table_id)
                .and_then(|file| file.read_page(*pid));
            match reloaded {
                Ok(page) => {
                    cache.put(*pid, Arc::new(RwLock::new(page)));
                }
                Err(e) => {
                    warn!("{} could not reload {} after abort: {}", tid, pid, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.inner.lock_manager.release_all(tid);
        debug!("{} aborted, {} page(s) discarded", tid, dirty.len());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Commit or abort `tid`.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        if commit {
            self.commit(tid)
        } else {
            self.abort(tid)
        }
    }

    /// Log and write one page if it is dirty.
    fn write_back(&self, pid: PageId, page: &PageRef) -> StorageResult<()> {
        let file = self.file(pid.table_id)?;
        let mut page = page.write();
        let Some(dirtier) = page.is_dirty() else {
            return Ok(());
        };

        let after = page.page_data();
        self.inner
            .log
            .log_write(dirtier, pid, &page.before_image(), &after)?;
        self.inner.log.force()?;
        file.write_page_data(pid, &after)?;

        page.mark_dirty(None);
        page.set_before_image();
        debug!("{} wrote {}", dirtier, pid);
        Ok(())
    }

    /// Write `pid` back if it is cached and dirty. Does not evict it.
    pub fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        let page = self.inner.cache.lock().peek(&pid).map(Arc::clone);
        match page {
            Some(page) => self.write_back(pid, &page),
            None => Ok(()),
        }
    }

    /// Write every page dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        for (pid, page) in self.dirty_pages(tid) {
            self.write_back(pid, &page)?;
        }
        Ok(())
    }

    /// Write every dirty page regardless of owner. This writes uncommitted
    /// changes; only tests and shutdown paths should call it.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let pages: Vec<(PageId, PageRef)> = {
            let cache = self.inner.cache.lock();
            cache
                .iter()
                .map(|(pid, page)| (*pid, Arc::clone(page)))
                .collect()
        };
        for (pid, page) in pages {
            self.write_back(pid, &page)?;
        }
        Ok(())
    }

    /// Drop `pid` from the cache without writing it.
    pub fn discard_page(&self, pid: PageId) {
        self.inner.cache.lock().remove(&pid);
    }

    /// Release one lock before the transaction ends.
    ///
    /// Breaks two-phase locking: only safe if `tid` has neither read data it
    /// relies on nor modified `pid`.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: PageId) {
        self.inner.lock_manager.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.inner.lock_manager.holds(tid, pid)
    }

    /// Whether `pid` is currently cached. Does not touch recency.
    pub fn is_cached(&self, pid: PageId) -> bool {
        self.inner.cache.lock().contains(&pid)
    }
}
