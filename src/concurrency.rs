//! Concurrency control: page-level shared/exclusive locking.

pub mod lock;

pub use lock::{Lock, LockManager, LockMode};
