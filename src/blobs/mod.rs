//! Content-addressed image storage.
//!
//! Images are stored by their SHA-256 hash, sharded into directories
//! by the first byte of the hash (like Git objects).

mod storage;

pub use storage::BlobStorage;
