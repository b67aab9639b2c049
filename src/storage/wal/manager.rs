//! Log sinks used by the buffer pool at commit.
//!
//! The buffer pool only needs two primitives: append a before/after image
//! pair, and force everything appended so far to stable storage. Replaying
//! the log after a crash is not implemented.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use parking_lot::Mutex;

use super::record::{LogRecord, LSN};
use crate::storage::error::StorageResult;
use crate::storage::PageId;
use crate::transaction::TransactionId;

/// Durable log consumed by the buffer pool.
pub trait LogFile: Send + Sync {
    /// Append an update record for `page_id`.
    fn log_write(
        &self,
        tid: TransactionId,
        page_id: PageId,
        before: &[u8],
        after: &[u8],
    ) -> StorageResult<()>;

    /// Make every record appended so far durable.
    fn force(&self) -> StorageResult<()>;
}

/// Configuration for [`FileLog`].
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Log file location.
    pub path: PathBuf,
    /// Whether `force` calls `fsync`. Turning this off keeps records in the
    /// OS cache only.
    pub sync_on_force: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            path: PathBuf::from("heapdb.log"),
            sync_on_force: true,
        }
    }
}

struct FileLogInner {
    writer: BufWriter<File>,
    next_lsn: LSN,
}

/// Append-only log file of length-prefixed `bincode` frames.
pub struct FileLog {
    config: WalConfig,
    inner: Mutex<FileLogInner>,
}

impl FileLog {
    /// Create (or truncate) the log file.
    pub fn create(config: WalConfig) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.path)?;

        Ok(FileLog {
            config,
            inner: Mutex::new(FileLogInner {
                writer: BufWriter::new(file),
                next_lsn: LSN(1),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Read back every complete record in the file at `path`.
    pub fn read_all(path: &Path) -> StorageResult<Vec<LogRecord>> {
        let mut file = File::open(path)?;
        let mut records = Vec::new();

        loop {
            let len = match file.read_u32::<LittleEndian>() {
                Ok(len) => len as usize,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let mut frame = vec![0u8; len];
            match file.read_exact(&mut frame) {
                Ok(()) => records.push(LogRecord::decode(&frame)?),
                // torn tail
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(records)
    }
}

impl LogFile for FileLog {
    fn log_write(
        &self,
        tid: TransactionId,
        page_id: PageId,
        before: &[u8],
        after: &[u8],
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let record = LogRecord {
            lsn: inner.next_lsn,
            tid,
            page_id,
            before: before.to_vec(),
            after: after.to_vec(),
        };
        let frame = record.encode()?;

        inner.writer.write_u32::<LittleEndian>(frame.len() as u32)?;
        inner.writer.write_all(&frame)?;
        inner.next_lsn = inner.next_lsn.next();

        debug!("{} logged {} for {}", record.lsn, page_id, tid);
        Ok(())
    }

    fn force(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        if self.config.sync_on_force {
            inner.writer.get_mut().sync_all()?;
        }
        Ok(())
    }
}

/// Keeps records in memory. Useful for tests and throwaway databases.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
    forced: Mutex<usize>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of records covered by the latest `force`.
    pub fn forced_count(&self) -> usize {
        *self.forced.lock()
    }
}

impl LogFile for MemoryLog {
    fn log_write(
        &self,
        tid: TransactionId,
        page_id: PageId,
        before: &[u8],
        after: &[u8],
    ) -> StorageResult<()> {
        let mut records = self.records.lock();
        let lsn = LSN(records.len() as u64 + 1);
        records.push(LogRecord {
            lsn,
            tid,
            page_id,
            before: before.to_vec(),
            after: after.to_vec(),
        });
        Ok(())
    }

    fn force(&self) -> StorageResult<()> {
        let len = self.records.lock().len();
        *self.forced.lock() = len;
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopLog;

impl LogFile for NoopLog {
    fn log_write(&self, _: TransactionId, _: PageId, _: &[u8], _: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    fn force(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::TableId;
    use anyhow::Result;
    use tempfile::tempdir;

    fn pid(n: u32) -> PageId {
        PageId::new(TableId(1), n)
    }

    #[test]
    fn test_file_log_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let config = WalConfig {
            path: dir.path().join("wal.log"),
            ..Default::default()
        };
        let log = FileLog::create(config)?;

        log.log_write(TransactionId::new(1), pid(0), &[0; 8], &[1; 8])?;
        log.log_write(TransactionId::new(2), pid(3), &[2; 8], &[3; 8])?;
        log.force()?;

        let records = FileLog::read_all(log.path())?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lsn, LSN(1));
        assert_eq!(records[1].lsn, LSN(2));
        assert_eq!(records[1].page_id, pid(3));
        assert_eq!(records[1].after, vec![3; 8]);

        Ok(())
    }

    #[test]
    fn test_unforced_records_may_be_missing() -> Result<()> {
        let dir = tempdir()?;
        let config = WalConfig {
            path: dir.path().join("wal.log"),
            sync_on_force: false,
        };
        let log = FileLog::create(config)?;
        log.log_write(TransactionId::new(1), pid(0), &[0; 4], &[1; 4])?;

        // Still in the write buffer
        assert!(FileLog::read_all(log.path())?.is_empty());

        log.force()?;
        assert_eq!(FileLog::read_all(log.path())?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_torn_tail_is_ignored() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("wal.log");
        let log = FileLog::create(WalConfig {
            path: path.clone(),
            sync_on_force: false,
        })?;
        log.log_write(TransactionId::new(1), pid(0), &[0; 4], &[1; 4])?;
        log.force()?;

        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_u32::<LittleEndian>(500)?;
        file.write_all(&[0xAB; 10])?;

        assert_eq!(FileLog::read_all(&path)?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_memory_log() -> StorageResult<()> {
        let log = MemoryLog::new();
        log.log_write(TransactionId::new(1), pid(0), &[0], &[1])?;
        assert_eq!(log.forced_count(), 0);

        log.force()?;
        assert_eq!(log.forced_count(), 1);
        assert_eq!(log.records()[0].tid, TransactionId::new(1));

        Ok(())
    }
}
