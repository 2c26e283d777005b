//! Recipe store facade: open lifecycle, CRUD and remote mirroring.

use crate::config::Config;
use crate::database::{Database, StoreConfig};
use crate::display::DisplayRecipe;
use crate::error::{Result, StoreError};
use crate::mirror::{HttpMirror, NoopMirror, RemoteMirror};
use crate::types::{Recipe, RecipeInput, RecordId, WriteMode};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Lifecycle of the store's database handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    Closed,
    Opening,
    Ready,
}

enum Lifecycle {
    Closed,
    Opening,
    Ready(Arc<Database>),
}

/// Local recipe store with a best-effort remote mirror.
///
/// Every operation except [`open`](Self::open) requires the store to be
/// ready and fails with [`StoreError::NotOpen`] otherwise. Mirror calls are
/// awaited after the local write commits; a mirror error is returned to the
/// caller but the local write stays.
pub struct RecipeStore {
    config: StoreConfig,
    mirror: Arc<dyn RemoteMirror>,
    lifecycle: RwLock<Lifecycle>,
    /// Serializes open attempts.
    open_lock: Mutex<()>,
}

impl RecipeStore {
    /// Create a closed store that mirrors through `mirror`.
    pub fn new(config: StoreConfig, mirror: impl RemoteMirror + 'static) -> Self {
        Self::with_mirror(config, Arc::new(mirror))
    }

    /// Create a closed store sharing an existing mirror.
    pub fn with_mirror(config: StoreConfig, mirror: Arc<dyn RemoteMirror>) -> Self {
        Self {
            config,
            mirror,
            lifecycle: RwLock::new(Lifecycle::Closed),
            open_lock: Mutex::new(()),
        }
    }

    /// Create a closed store that mirrors nowhere.
    pub fn offline(config: StoreConfig) -> Self {
        Self::new(config, NoopMirror)
    }

    /// Create a closed store from loaded configuration. Without a `[mirror]`
    /// section the store runs offline.
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.mirror {
            Some(mirror) => Ok(Self::new(config.store.clone(), HttpMirror::new(mirror)?)),
            None => Ok(Self::offline(config.store.clone())),
        }
    }

    /// Open the database, returning the shared handle.
    ///
    /// Idempotent: once ready, further calls return the same handle without
    /// touching the schema. A failed attempt leaves the store closed.
    pub async fn open(&self) -> Result<Arc<Database>> {
        let _open = self.open_lock.lock();

        if let Lifecycle::Ready(db) = &*self.lifecycle.read() {
            return Ok(Arc::clone(db));
        }

        *self.lifecycle.write() = Lifecycle::Opening;

        match Database::open(&self.config) {
            Ok(db) => {
                let db = Arc::new(db);
                *self.lifecycle.write() = Lifecycle::Ready(Arc::clone(&db));
                Ok(db)
            }
            Err(e) => {
                tracing::debug!(path = %self.config.path.display(), "open failed: {e}");
                *self.lifecycle.write() = Lifecycle::Closed;
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        match &*self.lifecycle.read() {
            Lifecycle::Closed => StoreState::Closed,
            Lifecycle::Opening => StoreState::Opening,
            Lifecycle::Ready(_) => StoreState::Ready,
        }
    }

    /// The open handle, or `NotOpen`.
    pub fn handle(&self) -> Result<Arc<Database>> {
        match &*self.lifecycle.read() {
            Lifecycle::Ready(db) => Ok(Arc::clone(db)),
            _ => Err(StoreError::NotOpen),
        }
    }

    /// Add a recipe under a generated key and mirror it.
    pub async fn add_item(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        image: impl Into<Vec<u8>>,
    ) -> Result<Recipe> {
        self.add_item_with_mode(RecipeInput::new(title, description, image), WriteMode::Upsert)
            .await
    }

    /// Write a recipe with an explicit write mode and mirror it.
    pub async fn add_item_with_mode(&self, input: RecipeInput, mode: WriteMode) -> Result<Recipe> {
        let db = self.handle()?;
        let recipe = db.put(input, mode)?;

        self.mirror.create(&recipe).await?;

        Ok(recipe)
    }

    /// Every recipe in ascending key order, with image references derived.
    pub async fn get_all_items(&self) -> Result<Vec<DisplayRecipe>> {
        let db = self.handle()?;
        let recipes = db.get_all()?;
        Ok(recipes.into_iter().map(DisplayRecipe::from).collect())
    }

    /// A single recipe by key.
    pub async fn get_item(&self, id: RecordId) -> Result<Option<DisplayRecipe>> {
        let db = self.handle()?;
        Ok(db.get(id)?.map(DisplayRecipe::from))
    }

    /// Recipes with the given title. Needs the `title` index.
    pub async fn find_by_title(&self, title: &str) -> Result<Vec<DisplayRecipe>> {
        let db = self.handle()?;
        Ok(db
            .find_by_title(title)?
            .into_iter()
            .map(DisplayRecipe::from)
            .collect())
    }

    /// Recipes with the given description. Needs the `description` index.
    pub async fn find_by_description(&self, description: &str) -> Result<Vec<DisplayRecipe>> {
        let db = self.handle()?;
        Ok(db
            .find_by_description(description)?
            .into_iter()
            .map(DisplayRecipe::from)
            .collect())
    }

    /// Number of stored recipes.
    pub fn count(&self) -> Result<usize> {
        Ok(self.handle()?.count())
    }

    /// Delete a recipe locally, then ask the mirror to delete it.
    ///
    /// The mirror is asked even when the key was unknown locally.
    pub async fn delete_item(&self, id: RecordId) -> Result<()> {
        let db = self.handle()?;
        db.delete(id)?;

        self.mirror.delete(id).await
    }
}
