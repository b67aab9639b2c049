//! Storage layer.
//!
//! - **PageManager**: raw page-sized block I/O on one file
//! - **HeapPage**: slot-bitmap page of fixed-width tuples
//! - **BufferPool**: page cache with page locks, commit and abort
//! - **wal**: log records emitted at commit

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;
pub mod wal;

pub use buffer::{BufferPool, BufferPoolConfig, PageRef};
pub use disk::{page_size, PageManager, DEFAULT_PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, Page, PageId, TableId};
