//! Tuple-oriented access to table files.
//!
//! - **Field / TupleDesc / Tuple**: typed rows with a fixed on-page width
//! - **HeapFile**: one table's pages on disk, plus tuple placement
//! - **HeapFileIterator**: sequential scan through the buffer pool

pub mod heap;
pub mod scan;
pub mod tuple;
pub mod tuple_desc;
pub mod value;

pub use heap::HeapFile;
pub use scan::HeapFileIterator;
pub use tuple::{RecordId, Tuple};
pub use tuple_desc::{TdItem, TupleDesc};
pub use value::{Field, FieldType, STRING_LEN};
