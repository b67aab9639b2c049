//! Storage layer error types.

use crate::access::RecordId;
use crate::storage::page::{PageId, TableId};
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The page lock could not be acquired before the randomized deadline.
    /// The caller must abort the transaction; it may retry as a new one.
    #[error("Transaction {tid} aborted: lock on {page_id} timed out")]
    TransactionAborted { tid: TransactionId, page_id: PageId },

    #[error("Page {page_id} is out of range (file has {num_pages} pages)")]
    PageOutOfRange { page_id: PageId, num_pages: u32 },

    #[error("Short read on {page_id}: got {read} of {expected} bytes")]
    ShortRead {
        page_id: PageId,
        read: usize,
        expected: usize,
    },

    #[error("Invalid page size: expected {expected} bytes, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Page is full: {0}")]
    PageFull(PageId),

    #[error("Tuple not found: {0:?}")]
    TupleNotFound(RecordId),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Field index {index} out of range ({num_fields} fields)")]
    FieldIndexOutOfRange { index: usize, num_fields: usize },

    #[error("No field named '{0}'")]
    NoSuchField(String),

    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    #[error("Transaction {0} is not active")]
    TransactionNotActive(TransactionId),

    #[error("Log error: {0}")]
    Log(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true for the recoverable lock-timeout signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::TransactionAborted { .. })
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Log(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
