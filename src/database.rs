//! The database handle tying the schema, record log, index and image
//! storage together.

use crate::blobs::BlobStorage;
use crate::error::{Result, StoreError};
use crate::records::{LogEntry, RecordIndex, RecordLog, StoredRecord};
use crate::schema::{
    self, Handshake, OpenState, Schema, DESCRIPTION_INDEX, IMAGE_INDEX, ITEMS_STORE, TITLE_INDEX,
};
use crate::types::{Hash, Recipe, RecipeInput, RecordId, Timestamp, WriteMode};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::Deserialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Store configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the database.
    pub path: PathBuf,

    /// Database name recorded in the manifest.
    pub name: String,

    /// Schema version to open at. Opening at a higher version than the one
    /// on disk runs the upgrade step.
    pub version: u32,

    /// Image cache size (number of images).
    pub blob_cache_size: usize,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Create non-unique `title`/`description`/`image` indexes when the
    /// `items` store is first created.
    pub secondary_indexes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./recipes"),
            name: "recipes".to_string(),
            version: 1,
            blob_cache_size: 64,
            create_if_missing: true,
            secondary_indexes: false,
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub record_count: u64,
    pub blob_count: u64,
    pub log_size_bytes: u64,
    pub blob_size_bytes: u64,
}

/// An open database containing the `items` object store.
///
/// Obtained only from [`Database::open`], so holding one means the open
/// handshake has completed. Read-write transactions hold the transaction
/// lock exclusively and read-only ones share it, so a reader never sees an
/// index entry whose image a concurrent write has already removed.
pub struct Database {
    path: PathBuf,

    schema: Schema,

    /// Lock file for exclusive access.
    _lock_file: File,

    log: RecordLog,

    index: RecordIndex,

    blobs: BlobStorage,

    /// Exclusive for read-write transactions, shared for read-only ones.
    txn_lock: RwLock<()>,
}

impl Database {
    /// Open the database, creating or upgrading it as needed.
    ///
    /// Calling this again on an already-current database makes no schema
    /// change.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let mut state = OpenState::Opening;
        tracing::debug!(path = %config.path.display(), ?state, "opening database");

        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized);
            }
            fs::create_dir_all(&config.path)?;
        } else if !config.create_if_missing && !schema::manifest_exists(&config.path) {
            return Err(StoreError::NotInitialized);
        }

        let lock_file = Self::acquire_lock(&config.path)?;

        let current = if schema::manifest_exists(&config.path) {
            let on_disk = schema::read_manifest(&config.path)?;
            if on_disk.name != config.name {
                return Err(StoreError::InvalidFormat(format!(
                    "Database at {} is named {:?}, not {:?}",
                    config.path.display(),
                    on_disk.name,
                    config.name
                )));
            }
            on_disk
        } else {
            Schema::empty(config.name.clone())
        };

        let from = current.version;
        let schema = match schema::handshake(current, config.version, config.secondary_indexes)? {
            Handshake::Current(schema) => schema,
            Handshake::Upgraded(schema) => {
                state = OpenState::Upgrading {
                    from,
                    to: schema.version,
                };
                tracing::info!(name = %schema.name, ?state, "upgrading database schema");
                schema::write_manifest(&config.path, &schema)?;
                schema
            }
        };

        let items = schema
            .object_store(ITEMS_STORE)
            .ok_or_else(|| StoreError::ObjectStoreNotFound(ITEMS_STORE.to_string()))?;
        let secondary_indexes = items.has_index(TITLE_INDEX);

        let log = RecordLog::open(config.path.join("items.log"))?;
        let index = RecordIndex::new(secondary_indexes);
        let blobs = BlobStorage::new(config.path.join("blobs"), config.blob_cache_size)?;

        Self::replay(&log, &index)?;

        state = OpenState::Ready;
        tracing::debug!(
            name = %schema.name,
            version = schema.version,
            records = index.count(),
            ?state,
            "database ready"
        );

        Ok(Self {
            path: config.path.clone(),
            schema,
            _lock_file: lock_file,
            log,
            index,
            blobs,
            txn_lock: RwLock::new(()),
        })
    }

    /// Rebuild the index from the log.
    fn replay(log: &RecordLog, index: &RecordIndex) -> Result<()> {
        for result in log.iter_from(0) {
            match result? {
                (offset, LogEntry::Put(record)) => {
                    index.put(&record, offset);
                }
                (_, LogEntry::Delete(id)) => {
                    index.remove(id);
                }
            }
        }
        Ok(())
    }

    // --- Read-write transactions ---

    /// Write a recipe into `items`.
    ///
    /// Without an explicit key the key generator assigns the next one. With
    /// an explicit key, `WriteMode::Insert` fails if the key exists and
    /// `WriteMode::Upsert` replaces the existing record.
    pub fn put(&self, input: RecipeInput, mode: WriteMode) -> Result<Recipe> {
        let _txn = self.txn_lock.write();

        let id = input.id.unwrap_or_else(|| self.index.next_key());
        if mode == WriteMode::Insert && self.index.contains(id) {
            return Err(StoreError::DuplicateKey(id));
        }

        let image = self.blobs.store(&input.image)?;
        let record = StoredRecord {
            id,
            title: input.title,
            description: input.description,
            image,
            updated_at: Timestamp::now(),
        };

        let offset = self.log.append(&LogEntry::Put(record.clone()))?;
        let previous = self.index.put(&record, offset);

        if let Some(previous) = previous {
            if previous.image != image {
                self.collect_image(&previous.image)?;
            }
        }

        tracing::debug!(%id, ?mode, offset, "put record");

        Ok(Recipe {
            id,
            title: record.title,
            description: record.description,
            image: input.image,
            updated_at: record.updated_at,
        })
    }

    /// Delete a recipe by key. Returns whether a record was removed;
    /// deleting an unknown key is a no-op.
    pub fn delete(&self, id: RecordId) -> Result<bool> {
        let _txn = self.txn_lock.write();

        if !self.index.contains(id) {
            tracing::debug!(%id, "delete of unknown key");
            return Ok(false);
        }

        self.log.append(&LogEntry::Delete(id))?;
        if let Some(removed) = self.index.remove(id) {
            self.collect_image(&removed.image)?;
        }

        tracing::debug!(%id, "deleted record");
        Ok(true)
    }

    /// Remove an image blob once no live record references it.
    fn collect_image(&self, image: &Hash) -> Result<()> {
        if self.index.image_ref_count(image) == 0 {
            self.blobs.delete(image)?;
        }
        Ok(())
    }

    // --- Read-only transactions ---

    /// Get a recipe by key.
    pub fn get(&self, id: RecordId) -> Result<Option<Recipe>> {
        let _txn = self.txn_lock.read();
        self.get_unlocked(id)
    }

    /// Get every recipe in ascending key order.
    pub fn get_all(&self) -> Result<Vec<Recipe>> {
        let _txn = self.txn_lock.read();
        self.index
            .offsets()
            .into_iter()
            .map(|(id, offset)| self.read_record(id, offset))
            .collect()
    }

    /// Recipes whose title equals `title`.
    pub fn find_by_title(&self, title: &str) -> Result<Vec<Recipe>> {
        let _txn = self.txn_lock.read();
        self.require_index(TITLE_INDEX)?;
        let ids = self.index.by_title(title).unwrap_or_default();
        self.get_many(ids)
    }

    /// Recipes whose description equals `description`.
    pub fn find_by_description(&self, description: &str) -> Result<Vec<Recipe>> {
        let _txn = self.txn_lock.read();
        self.require_index(DESCRIPTION_INDEX)?;
        let ids = self.index.by_description(description).unwrap_or_default();
        self.get_many(ids)
    }

    /// Recipes whose image bytes equal `image`.
    pub fn find_by_image(&self, image: &[u8]) -> Result<Vec<Recipe>> {
        let _txn = self.txn_lock.read();
        self.require_index(IMAGE_INDEX)?;
        let ids = self.index.by_image(&Hash::from_bytes(image));
        self.get_many(ids)
    }

    /// Number of live recipes.
    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// The schema the database was opened with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Schema version.
    pub fn version(&self) -> u32 {
        self.schema.version
    }

    /// Directory holding the database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let _txn = self.txn_lock.read();
        Ok(StoreStats {
            record_count: self.index.count() as u64,
            blob_count: self.blobs.list()?.len() as u64,
            log_size_bytes: self.log.size(),
            blob_size_bytes: self.blobs.total_size()?,
        })
    }

    /// Force sync the record log to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    fn get_unlocked(&self, id: RecordId) -> Result<Option<Recipe>> {
        match self.index.get(id) {
            Some(entry) => self.read_record(id, entry.offset).map(Some),
            None => Ok(None),
        }
    }

    fn get_many(&self, ids: Vec<RecordId>) -> Result<Vec<Recipe>> {
        let mut recipes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(recipe) = self.get_unlocked(id)? {
                recipes.push(recipe);
            }
        }
        Ok(recipes)
    }

    fn require_index(&self, name: &str) -> Result<()> {
        let has_index = self
            .schema
            .object_store(ITEMS_STORE)
            .is_some_and(|store| store.has_index(name));
        if has_index {
            Ok(())
        } else {
            Err(StoreError::IndexNotFound(name.to_string()))
        }
    }

    fn read_record(&self, id: RecordId, offset: u64) -> Result<Recipe> {
        let record = match self.log.read_at(offset)? {
            LogEntry::Put(record) if record.id == id => record,
            other => {
                return Err(StoreError::Corruption(format!(
                    "index points {id} at offset {offset}, found {other:?}"
                )));
            }
        };

        let image = self
            .blobs
            .get(&record.image)?
            .ok_or(StoreError::BlobNotFound(record.image))?;

        Ok(Recipe {
            id: record.id,
            title: record.title,
            description: record.description,
            image,
            updated_at: record.updated_at,
        })
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
