//! Core types for the recipe store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Primary key of a record in the `items` object store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash for image blobs (SHA-256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }

    /// First byte of the hash as hex, used for directory sharding.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[0..1])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. Clocks before the epoch read as zero.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A recipe stored in the `items` object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipe {
    /// Primary key (assigned by the key generator unless given explicitly).
    pub id: RecordId,

    pub title: String,

    pub description: String,

    /// Raw image bytes, opaque to the store.
    pub image: Vec<u8>,

    /// When this version of the record was written.
    pub updated_at: Timestamp,
}

/// Input for writing a recipe (before the key is resolved).
#[derive(Clone, Debug)]
pub struct RecipeInput {
    /// Explicit key. `None` lets the key generator assign one.
    pub id: Option<RecordId>,
    pub title: String,
    pub description: String,
    pub image: Vec<u8>,
}

impl RecipeInput {
    /// Create a new input with a generated key.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        image: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            image: image.into(),
        }
    }

    /// Write under an explicit key instead of a generated one.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }
}

/// How a write treats an existing record with the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Fail with `StoreError::DuplicateKey` if the key exists.
    Insert,
    /// Replace the existing record.
    #[default]
    Upsert,
}
