use crate::access::{HeapFile, HeapFileIterator, TupleDesc};
use crate::storage::buffer::{BufferPool, BufferPoolConfig};
use crate::storage::page::TableId;
use crate::storage::wal::LogFile;
use crate::transaction::{Transaction, TransactionId, TransactionManager};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// High-level database interface that wires the buffer pool, the log and
/// transaction bookkeeping together
pub struct Database {
    buffer_pool: BufferPool,
    transactions: Arc<TransactionManager>,
    next_table_id: AtomicU32,
}

impl Database {
    pub fn new(config: BufferPoolConfig, log: Arc<dyn LogFile>) -> Self {
        let buffer_pool = BufferPool::new(config, log);
        Self {
            transactions: Arc::new(TransactionManager::new(buffer_pool.clone())),
            buffer_pool,
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Create a new, empty table file at `path`
    pub fn create_table(&self, path: &Path, desc: Arc<TupleDesc>) -> Result<Arc<HeapFile>> {
        if path.exists() {
            bail!("Table file already exists at {:?}", path);
        }
        let file = HeapFile::create(path, self.allocate_table_id(), desc)
            .with_context(|| format!("Failed to create table file {:?}", path))?;
        Ok(self.register(file))
    }

    /// Open an existing table file at `path`
    pub fn open_table(&self, path: &Path, desc: Arc<TupleDesc>) -> Result<Arc<HeapFile>> {
        if !path.exists() {
            bail!("Table file does not exist at {:?}", path);
        }
        let file = HeapFile::open(path, self.allocate_table_id(), desc)
            .with_context(|| format!("Failed to open table file {:?}", path))?;
        Ok(self.register(file))
    }

    fn allocate_table_id(&self) -> TableId {
        TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, file: HeapFile) -> Arc<HeapFile> {
        let file = Arc::new(file);
        self.buffer_pool.register_file(Arc::clone(&file));
        file
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Start a transaction that aborts unless committed
    pub fn begin(&self) -> Transaction {
        Transaction::begin(&self.transactions)
    }

    /// Scan cursor over table `table_id` on behalf of `tid`
    pub fn scan(&self, table_id: TableId, tid: TransactionId) -> Result<HeapFileIterator> {
        let file = self.buffer_pool.file(table_id)?;
        Ok(file.iter(&self.buffer_pool, tid))
    }
}
