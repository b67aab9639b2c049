//! Transactions.
//!
//! A transaction is just an id as far as the storage layer is concerned. The
//! [`TransactionManager`] hands out ids and finishes transactions through the
//! buffer pool; [`Transaction`] is an RAII handle that aborts if dropped
//! unfinished.

pub mod id;
pub mod manager;

pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::{Transaction, TransactionManager};
