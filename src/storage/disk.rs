//! Disk I/O and the process-wide page size.

pub mod page_manager;

use std::sync::atomic::{AtomicUsize, Ordering};

pub use page_manager::PageManager;

/// Bytes per page unless overridden for a test.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Current page size. Files capture this value when they are opened.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::SeqCst)
}

/// Override the page size. Only meant for tests; affects files opened afterwards.
pub fn set_page_size(size: usize) {
    PAGE_SIZE.store(size, Ordering::SeqCst);
}

pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::SeqCst);
}
