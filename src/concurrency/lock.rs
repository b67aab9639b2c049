//! Page-level shared/exclusive locks.
//!
//! The lock table maps each locked page to the list of locks currently
//! granted on it. Requests are never queued: `try_acquire` either grants
//! immediately or refuses, and `acquire` waits on a condition variable that is
//! signalled whenever a lock is released, retrying until its deadline.

use crate::storage::PageId;
use crate::transaction::TransactionId;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// A lock granted to one transaction on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    pub tid: TransactionId,
    pub mode: LockMode,
}

/// Lock table shared by every transaction using a buffer pool.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<PageId, Vec<Lock>>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `mode` on `pid` to `tid` if compatible with the locks already held.
    pub fn try_acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let mut table = self.table.lock();
        Self::grant(&mut table, tid, pid, mode)
    }

    /// Like [`try_acquire`](Self::try_acquire), but keeps retrying until
    /// `timeout` elapses. Returns false if the lock was never granted.
    pub fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();

        loop {
            if Self::grant(&mut table, tid, pid, mode) {
                return true;
            }
            if self.released.wait_until(&mut table, deadline).timed_out() {
                // One last look: a release may have raced with the timeout.
                return Self::grant(&mut table, tid, pid, mode);
            }
        }
    }

    fn grant(
        table: &mut HashMap<PageId, Vec<Lock>>,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> bool {
        let locks = table.entry(pid).or_default();

        if locks.is_empty() {
            locks.push(Lock { tid, mode });
            trace!("{} granted {:?} on {}", tid, mode, pid);
            return true;
        }

        if locks.len() == 1 {
            let held = &mut locks[0];
            if held.tid == tid {
                // Sole holder: upgrade in place, never add a second entry.
                if held.mode == LockMode::Shared && mode == LockMode::Exclusive {
                    held.mode = LockMode::Exclusive;
                    trace!("{} upgraded to Exclusive on {}", tid, pid);
                }
                return true;
            }
            if held.mode.is_compatible_with(&mode) {
                locks.push(Lock { tid, mode });
                return true;
            }
            return false;
        }

        // Several holders means several readers.
        if mode == LockMode::Exclusive {
            return false;
        }
        if !locks.iter().any(|lock| lock.tid == tid) {
            locks.push(Lock { tid, mode });
        }
        true
    }

    /// Drop `tid`'s lock on `pid`. Releasing a lock that is not held is a no-op.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut table = self.table.lock();
        if let Some(locks) = table.get_mut(&pid) {
            if let Some(pos) = locks.iter().position(|lock| lock.tid == tid) {
                locks.remove(pos);
            }
            if locks.is_empty() {
                table.remove(&pid);
            }
        }
        drop(table);
        self.released.notify_all();
    }

    /// Drop every lock `tid` holds.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        table.retain(|_, locks| {
            locks.retain(|lock| lock.tid != tid);
            !locks.is_empty()
        });
        drop(table);
        self.released.notify_all();
    }

    /// True iff `tid` has any lock on `pid`.
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        let table = self.table.lock();
        table
            .get(&pid)
            .is_some_and(|locks| locks.iter().any(|lock| lock.tid == tid))
    }

    /// Snapshot of the locks granted on `pid`.
    pub fn locks_on(&self, pid: PageId) -> Vec<Lock> {
        self.table.lock().get(&pid).cloned().unwrap_or_default()
    }

    /// Pages on which `tid` currently holds a lock.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        table
            .iter()
            .filter(|(_, locks)| locks.iter().any(|lock| lock.tid == tid))
            .map(|(pid, _)| *pid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::TableId;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn pid(n: u32) -> PageId {
        PageId::new(TableId(1), n)
    }

    fn tid(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn test_lock_compatibility() {
        assert!(LockMode::Shared.is_compatible_with(&LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible_with(&LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible_with(&LockMode::Shared));
        assert!(!LockMode::Exclusive.is_compatible_with(&LockMode::Exclusive));
    }

    #[test]
    fn test_basic_acquire_release() {
        let manager = LockManager::new();

        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.holds(tid(1), pid(0)));

        manager.release(tid(1), pid(0));
        assert!(!manager.holds(tid(1), pid(0)));
        assert!(manager.table.lock().is_empty());
    }

    #[test]
    fn test_multiple_readers_then_writer_denied() {
        let manager = LockManager::new();

        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert_eq!(manager.locks_on(pid(0)).len(), 2);

        assert!(!manager.try_acquire(tid(3), pid(0), LockMode::Exclusive));

        manager.release(tid(1), pid(0));
        assert!(!manager.try_acquire(tid(3), pid(0), LockMode::Exclusive));

        manager.release(tid(2), pid(0));
        assert!(manager.try_acquire(tid(3), pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_upgrade_in_place() {
        let manager = LockManager::new();

        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));

        let locks = manager.locks_on(pid(0));
        assert_eq!(
            locks,
            vec![Lock {
                tid: tid(1),
                mode: LockMode::Exclusive
            }]
        );

        // Asking for shared while holding exclusive keeps exclusive
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert_eq!(manager.locks_on(pid(0))[0].mode, LockMode::Exclusive);
    }

    #[test]
    fn test_no_upgrade_with_other_readers() {
        let manager = LockManager::new();

        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert!(!manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_exclusive_blocks_everyone_else() {
        let manager = LockManager::new();

        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        assert!(!manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert!(!manager.try_acquire(tid(2), pid(0), LockMode::Exclusive));
        assert_eq!(manager.locks_on(pid(0)).len(), 1);
    }

    #[test]
    fn test_reader_idempotent_among_many() {
        let manager = LockManager::new();

        for t in 1..=3 {
            assert!(manager.try_acquire(tid(t), pid(0), LockMode::Shared));
        }
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert_eq!(manager.locks_on(pid(0)).len(), 3);
    }

    #[test]
    fn test_release_all() {
        let manager = LockManager::new();

        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(1), pid(1), LockMode::Exclusive));
        assert!(manager.try_acquire(tid(1), pid(2), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(2), LockMode::Shared));
        assert_eq!(manager.pages_locked_by(tid(1)).len(), 3);

        manager.release_all(tid(1));

        assert!(manager.pages_locked_by(tid(1)).is_empty());
        assert!(manager.holds(tid(2), pid(2)));
        assert_eq!(manager.table.lock().len(), 1);
    }

    #[test]
    fn test_release_not_held_is_noop() {
        let manager = LockManager::new();
        manager.release(tid(1), pid(0));

        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        manager.release(tid(1), pid(0));
        assert!(manager.holds(tid(2), pid(0)));
    }

    #[test]
    fn test_acquire_times_out() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));

        let start = Instant::now();
        assert!(!manager.acquire(tid(2), pid(0), LockMode::Shared, Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(!manager.holds(tid(2), pid(0)));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let manager = Arc::new(LockManager::new());
        let barrier = Arc::new(Barrier::new(2));
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));

        let waiter = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.acquire(tid(2), pid(0), LockMode::Exclusive, Duration::from_secs(5))
            })
        };

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        manager.release_all(tid(1));

        assert!(waiter.join().unwrap());
        assert!(manager.holds(tid(2), pid(0)));
    }

    #[test]
    fn test_exclusivity_under_contention() {
        let manager = Arc::new(LockManager::new());
        let page = pid(7);

        let handles: Vec<_> = (1..=8)
            .map(|t| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for round in 0..200 {
                        let mode = if (t + round) % 3 == 0 {
                            LockMode::Exclusive
                        } else {
                            LockMode::Shared
                        };
                        if manager.try_acquire(tid(t), page, mode) {
                            let locks = manager.locks_on(page);
                            let exclusive = locks
                                .iter()
                                .filter(|l| l.mode == LockMode::Exclusive)
                                .count();
                            assert!(exclusive == 0 || locks.len() == 1);
                            manager.release(tid(t), page);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(manager.locks_on(page).is_empty());
    }
}
