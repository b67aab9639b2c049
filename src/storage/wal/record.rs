//! Log record layout.

use crate::storage::PageId;
use crate::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log Sequence Number - a unique identifier for log records.
/// LSNs are monotonically increasing and used to order log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LSN(pub u64);

impl LSN {
    pub fn next(&self) -> Self {
        LSN(self.0 + 1)
    }
}

impl fmt::Display for LSN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LSN({})", self.0)
    }
}

/// Full-page update record: the page as it was on disk and as it is about
/// to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub lsn: LSN,
    pub tid: TransactionId,
    pub page_id: PageId,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl LogRecord {
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn decode(data: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(data)
    }
}
