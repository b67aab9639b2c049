//! Write-ahead log hooks.
//!
//! The buffer pool emits one before/after image record per dirty page at
//! commit and forces the log before the page itself is written.

pub mod manager;
pub mod record;

pub use manager::{FileLog, LogFile, MemoryLog, NoopLog, WalConfig};
pub use record::{LogRecord, LSN};
