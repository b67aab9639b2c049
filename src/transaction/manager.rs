//! Transaction lifecycle on top of a buffer pool.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use super::id::{TransactionId, TransactionIdGenerator};
use crate::storage::buffer::BufferPool;
use crate::storage::error::{StorageError, StorageResult};

/// Hands out transaction ids and finishes transactions through the pool.
pub struct TransactionManager {
    pool: BufferPool,
    id_generator: TransactionIdGenerator,
    active: RwLock<HashSet<TransactionId>>,
}

impl TransactionManager {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            id_generator: TransactionIdGenerator::new(),
            active: RwLock::new(HashSet::new()),
        }
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn begin(&self) -> TransactionId {
        let id = self.id_generator.next();
        self.active.write().insert(id);
        debug!("{} started", id);
        id
    }

    /// Make `id`'s changes durable and release its locks.
    ///
    /// If the pool fails to write a page the transaction stays active, so it
    /// can still be aborted.
    pub fn commit(&self, id: TransactionId) -> StorageResult<()> {
        self.ensure_active(id)?;
        self.pool.commit(id)?;
        self.active.write().remove(&id);
        Ok(())
    }

    /// Roll back `id`. The transaction is finished even if reloading a page
    /// fails.
    pub fn abort(&self, id: TransactionId) -> StorageResult<()> {
        self.ensure_active(id)?;
        let result = self.pool.abort(id);
        self.active.write().remove(&id);
        result
    }

    fn ensure_active(&self, id: TransactionId) -> StorageResult<()> {
        if self.active.read().contains(&id) {
            Ok(())
        } else {
            Err(StorageError::TransactionNotActive(id))
        }
    }

    pub fn is_active(&self, id: TransactionId) -> bool {
        self.active.read().contains(&id)
    }

    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.active.read().iter().copied().collect()
    }
}

/// A handle to a transaction that automatically aborts on drop if still active.
pub struct Transaction {
    id: TransactionId,
    manager: Arc<TransactionManager>,
    finished: bool,
}

impl Transaction {
    pub fn begin(manager: &Arc<TransactionManager>) -> Self {
        Self {
            id: manager.begin(),
            manager: Arc::clone(manager),
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Commits the transaction. On failure the handle is dropped and the
    /// transaction aborted.
    pub fn commit(mut self) -> StorageResult<()> {
        self.manager.commit(self.id)?;
        self.finished = true;
        Ok(())
    }

    pub fn abort(mut self) -> StorageResult<()> {
        self.finished = true;
        self.manager.abort(self.id)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.manager.abort(self.id) {
                warn!("abort of dropped {} failed: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Field, FieldType, HeapFile, Tuple, TupleDesc};
    use crate::concurrency::LockMode;
    use crate::storage::buffer::BufferPoolConfig;
    use crate::storage::page::{PageId, TableId};
    use crate::storage::wal::NoopLog;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn setup() -> Result<(TempDir, Arc<TransactionManager>)> {
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::unnamed(&[FieldType::Int]));
        let file = HeapFile::create(&dir.path().join("t.dat"), TableId(1), desc)?;
        let pool = BufferPool::new(BufferPoolConfig::default(), Arc::new(NoopLog));
        pool.register_file(Arc::new(file));
        Ok((dir, Arc::new(TransactionManager::new(pool))))
    }

    fn insert(manager: &TransactionManager, tid: TransactionId, v: i32) -> Result<()> {
        let pool = manager.buffer_pool();
        let desc = Arc::clone(pool.file(TableId(1))?.desc());
        pool.insert_tuple(tid, TableId(1), Tuple::new(desc, vec![Field::Int(v)])?)?;
        Ok(())
    }

    #[test]
    fn test_begin_commit_abort() -> Result<()> {
        let (_dir, manager) = setup()?;

        let id1 = manager.begin();
        let id2 = manager.begin();
        assert_ne!(id1, id2);
        assert_eq!(manager.active_transactions().len(), 2);

        manager.commit(id1)?;
        assert!(!manager.is_active(id1));
        // Can't commit again
        assert!(matches!(
            manager.commit(id1),
            Err(StorageError::TransactionNotActive(_))
        ));

        manager.abort(id2)?;
        assert!(manager.active_transactions().is_empty());
        assert!(manager.abort(id2).is_err());

        Ok(())
    }

    #[test]
    fn test_commit_releases_locks() -> Result<()> {
        let (_dir, manager) = setup()?;
        let txn = Transaction::begin(&manager);
        let id = txn.id();

        insert(&manager, id, 1)?;
        let pid = PageId::new(TableId(1), 0);
        assert!(manager.buffer_pool().holds_lock(id, pid));

        txn.commit()?;
        assert!(!manager.buffer_pool().holds_lock(id, pid));
        assert!(!manager.is_active(id));

        Ok(())
    }

    #[test]
    fn test_drop_aborts() -> Result<()> {
        let (_dir, manager) = setup()?;
        let pid = PageId::new(TableId(1), 0);

        let id = {
            let txn = Transaction::begin(&manager);
            insert(&manager, txn.id(), 7)?;
            txn.id()
        };
        assert!(!manager.is_active(id));
        assert!(!manager.buffer_pool().holds_lock(id, pid));

        // The insert was rolled back
        let reader = Transaction::begin(&manager);
        let page = manager
            .buffer_pool()
            .fetch(reader.id(), pid, LockMode::Shared)?;
        assert_eq!(page.read().tuples().count(), 0);
        reader.commit()?;

        Ok(())
    }
}
