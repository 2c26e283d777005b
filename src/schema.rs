//! Database schema, on-disk manifest and the open/upgrade handshake.
//!
//! The manifest records the database name, its schema version and the
//! object stores it contains. Opening with a higher version than the one on
//! disk runs the upgrade step; opening with the same version changes nothing.
//! The only upgrade step is 0 -> 1, which creates the `items` store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Magic bytes for the store manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"RCP\0";

/// Current manifest format version (unrelated to the schema version).
const MANIFEST_FORMAT: u8 = 1;

const MANIFEST_FILE: &str = "MANIFEST";

/// The only schema version this build knows how to open.
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the single object store holding recipes.
pub const ITEMS_STORE: &str = "items";

/// Key path of the `items` object store.
pub const ITEMS_KEY_PATH: &str = "id";

/// Names of the optional secondary indexes.
pub const TITLE_INDEX: &str = "title";
pub const DESCRIPTION_INDEX: &str = "description";
pub const IMAGE_INDEX: &str = "image";

/// Definition of a secondary index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub key_path: String,
    pub unique: bool,
}

/// Definition of an object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreSchema {
    pub name: String,
    pub key_path: String,
    pub auto_increment: bool,
    pub indexes: Vec<IndexSchema>,
}

impl ObjectStoreSchema {
    /// Check whether the store has an index with this name.
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|index| index.name == name)
    }
}

/// Schema of a named database at a given version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub version: u32,
    pub object_stores: Vec<ObjectStoreSchema>,
}

impl Schema {
    /// A database that has never been upgraded (version 0, no stores).
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            object_stores: Vec::new(),
        }
    }

    /// Look up an object store by name.
    pub fn object_store(&self, name: &str) -> Option<&ObjectStoreSchema> {
        self.object_stores.iter().find(|store| store.name == name)
    }
}

/// Stage of the open handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenState {
    Opening,
    Upgrading { from: u32, to: u32 },
    Ready,
}

/// Outcome of comparing the on-disk schema with the requested version.
#[derive(Debug)]
pub enum Handshake {
    /// On-disk schema is current; nothing to write.
    Current(Schema),
    /// Schema was upgraded and must be persisted.
    Upgraded(Schema),
}

/// Compare `current` against `requested_version` and run the upgrade step
/// when the database is behind.
///
/// Requesting any version other than [`SCHEMA_VERSION`] fails with
/// `UnsupportedVersion`.
///
/// The upgrade creates the `items` object store with an auto-incrementing
/// `id` key if it is absent, with non-unique `title`, `description` and
/// `image` indexes when `secondary_indexes` is set. An existing store is
/// left untouched.
pub fn handshake(
    current: Schema,
    requested_version: u32,
    secondary_indexes: bool,
) -> Result<Handshake> {
    if current.version > requested_version {
        return Err(StoreError::VersionTooNew {
            requested: requested_version,
            current: current.version,
        });
    }

    if requested_version != SCHEMA_VERSION {
        return Err(StoreError::UnsupportedVersion(requested_version));
    }

    if current.version == requested_version {
        return Ok(Handshake::Current(current));
    }

    let mut upgraded = current;
    if upgraded.object_store(ITEMS_STORE).is_none() {
        upgraded.object_stores.push(items_store(secondary_indexes));
    }
    upgraded.version = requested_version;

    Ok(Handshake::Upgraded(upgraded))
}

fn items_store(secondary_indexes: bool) -> ObjectStoreSchema {
    let indexes = if secondary_indexes {
        [TITLE_INDEX, DESCRIPTION_INDEX, IMAGE_INDEX]
            .into_iter()
            .map(|name| IndexSchema {
                name: name.to_string(),
                key_path: name.to_string(),
                unique: false,
            })
            .collect()
    } else {
        Vec::new()
    };

    ObjectStoreSchema {
        name: ITEMS_STORE.to_string(),
        key_path: ITEMS_KEY_PATH.to_string(),
        auto_increment: true,
        indexes,
    }
}

/// Check whether a manifest exists in the database directory.
pub fn manifest_exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).exists()
}

/// Write the manifest, replacing any previous one atomically.
pub fn write_manifest(dir: &Path, schema: &Schema) -> Result<()> {
    let encoded = rmp_serde::to_vec_named(schema)?;

    let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
    let mut file = File::create(&tmp_path)?;

    file.write_all(MANIFEST_MAGIC)?;
    file.write_all(&[MANIFEST_FORMAT])?;
    file.write_all(&(encoded.len() as u32).to_le_bytes())?;
    file.write_all(&encoded)?;
    file.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
    file.sync_all()?;

    fs::rename(&tmp_path, dir.join(MANIFEST_FILE))?;

    Ok(())
}

/// Read the manifest from the database directory.
pub fn read_manifest(dir: &Path) -> Result<Schema> {
    let mut file = File::open(dir.join(MANIFEST_FILE))?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != MANIFEST_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid store magic".into()));
    }

    let mut format = [0u8; 1];
    file.read_exact(&mut format)?;
    if format[0] != MANIFEST_FORMAT {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported manifest format: {}",
            format[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    file.read_exact(&mut len_bytes)?;
    let mut encoded = vec![0u8; u32::from_le_bytes(len_bytes) as usize];
    file.read_exact(&mut encoded)?;

    let mut checksum_bytes = [0u8; 4];
    file.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);
    let computed_checksum = crc32fast::hash(&encoded);
    if stored_checksum != computed_checksum {
        return Err(StoreError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    Ok(rmp_serde::from_slice(&encoded)?)
}
