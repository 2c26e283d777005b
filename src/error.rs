//! Error types for the recipe store.

use crate::types::{Hash, RecordId};
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database is not open")]
    NotOpen,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Store is locked by another process")]
    Locked,

    #[error("Requested version {requested} is older than on-disk version {current}")]
    VersionTooNew { requested: u32, current: u32 },

    #[error("Unsupported schema version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Object store not found: {0}")]
    ObjectStoreNotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Key already exists: {0}")]
    DuplicateKey(RecordId),

    #[error("Blob not found: {0}")]
    BlobNotFound(Hash),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: Hash, got: Hash },

    #[error("Remote mirror error: {0}")]
    Mirror(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Mirror(e.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(e: toml::de::Error) -> Self {
        StoreError::Config(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
