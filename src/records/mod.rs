//! Record log and indexes for the `items` object store.
//!
//! Mutations are appended to a log of put/delete frames; the index maps
//! each live key to the offset of its latest put.

mod index;
mod log;

pub use index::{IndexEntry, RecordIndex};
pub use log::{LogEntry, LogIterator, RecordLog, StoredRecord};
