//! In-memory primary and secondary indexes over the record log.

use crate::records::log::StoredRecord;
use crate::types::{Hash, RecordId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Location and indexed fields of the live version of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset of the put frame in the log.
    pub offset: u64,
    pub title: String,
    pub description: String,
    pub image: Hash,
}

#[derive(Default)]
struct IndexState {
    /// Primary key to live entry, ascending.
    primary: BTreeMap<RecordId, IndexEntry>,

    /// Image hash to the records referencing it. Always maintained so
    /// unreferenced image blobs can be collected.
    by_image: HashMap<Hash, BTreeSet<RecordId>>,

    /// Non-unique secondary indexes (present only when the schema has them).
    by_title: Option<HashMap<String, BTreeSet<RecordId>>>,
    by_description: Option<HashMap<String, BTreeSet<RecordId>>>,

    /// Highest key ever written; the key generator continues from here.
    max_key: u64,
}

/// Index over the live records of the `items` object store.
///
/// Rebuilt from the log on open; never persisted.
pub struct RecordIndex {
    state: RwLock<IndexState>,
}

impl RecordIndex {
    /// Create an empty index, optionally maintaining title/description indexes.
    pub fn new(secondary_indexes: bool) -> Self {
        let state = IndexState {
            by_title: secondary_indexes.then(HashMap::new),
            by_description: secondary_indexes.then(HashMap::new),
            ..Default::default()
        };

        Self {
            state: RwLock::new(state),
        }
    }

    /// Record a put. Returns the entry it replaced, if any.
    pub fn put(&self, record: &StoredRecord, offset: u64) -> Option<IndexEntry> {
        let mut state = self.state.write();

        let previous = state.primary.remove(&record.id);
        if let Some(prev) = &previous {
            state.unlink(record.id, prev);
        }

        let entry = IndexEntry {
            offset,
            title: record.title.clone(),
            description: record.description.clone(),
            image: record.image,
        };
        state.link(record.id, &entry);
        state.primary.insert(record.id, entry);
        state.max_key = state.max_key.max(record.id.0);

        previous
    }

    /// Record a delete. Returns the removed entry, if the key was live.
    pub fn remove(&self, id: RecordId) -> Option<IndexEntry> {
        let mut state = self.state.write();
        let removed = state.primary.remove(&id);
        if let Some(entry) = &removed {
            state.unlink(id, entry);
        }
        removed
    }

    /// Get the live entry for a key.
    pub fn get(&self, id: RecordId) -> Option<IndexEntry> {
        self.state.read().primary.get(&id).cloned()
    }

    /// Check whether a key is live.
    pub fn contains(&self, id: RecordId) -> bool {
        self.state.read().primary.contains_key(&id)
    }

    /// All live keys with their log offsets, in ascending key order.
    pub fn offsets(&self) -> Vec<(RecordId, u64)> {
        self.state
            .read()
            .primary
            .iter()
            .map(|(id, entry)| (*id, entry.offset))
            .collect()
    }

    /// Keys whose title equals `title`, or `None` without a title index.
    pub fn by_title(&self, title: &str) -> Option<Vec<RecordId>> {
        let state = self.state.read();
        let index = state.by_title.as_ref()?;
        Some(lookup(index.get(title)))
    }

    /// Keys whose description equals `description`, or `None` without a
    /// description index.
    pub fn by_description(&self, description: &str) -> Option<Vec<RecordId>> {
        let state = self.state.read();
        let index = state.by_description.as_ref()?;
        Some(lookup(index.get(description)))
    }

    /// Keys whose image has the given hash.
    pub fn by_image(&self, image: &Hash) -> Vec<RecordId> {
        lookup(self.state.read().by_image.get(image))
    }

    /// Number of live records referencing an image.
    pub fn image_ref_count(&self, image: &Hash) -> usize {
        self.state
            .read()
            .by_image
            .get(image)
            .map_or(0, BTreeSet::len)
    }

    /// Next key the generator hands out.
    pub fn next_key(&self) -> RecordId {
        RecordId(self.state.read().max_key + 1)
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        self.state.read().primary.len()
    }
}

impl IndexState {
    fn link(&mut self, id: RecordId, entry: &IndexEntry) {
        self.by_image.entry(entry.image).or_default().insert(id);
        if let Some(index) = self.by_title.as_mut() {
            index.entry(entry.title.clone()).or_default().insert(id);
        }
        if let Some(index) = self.by_description.as_mut() {
            index.entry(entry.description.clone()).or_default().insert(id);
        }
    }

    fn unlink(&mut self, id: RecordId, entry: &IndexEntry) {
        remove_from(&mut self.by_image, &entry.image, id);
        if let Some(index) = self.by_title.as_mut() {
            remove_from(index, &entry.title, id);
        }
        if let Some(index) = self.by_description.as_mut() {
            remove_from(index, &entry.description, id);
        }
    }
}

fn remove_from<K>(index: &mut HashMap<K, BTreeSet<RecordId>>, key: &K, id: RecordId)
where
    K: std::hash::Hash + Eq,
{
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn lookup(ids: Option<&BTreeSet<RecordId>>) -> Vec<RecordId> {
    ids.map(|ids| ids.iter().copied().collect())
        .unwrap_or_default()
}
