//! # Recipe Store
//!
//! An embedded record store for recipes (title, description, image) that
//! mirrors writes and deletes to a remote HTTP API on a best-effort basis.
//!
//! ## Core Concepts
//!
//! - **Database**: a directory holding one named, versioned database with a
//!   single `items` object store keyed by an auto-incrementing `id`
//! - **Records**: put/delete frames in an append-only log, indexed in memory
//! - **Images**: content-addressed blobs, shared between identical images
//! - **Mirror**: a remote copy told about creates and deletes, never reconciled
//! - **Display**: images are handed out as `data:` URLs at read time
//!
//! ## Example
//!
//! ```ignore
//! use recipe_store::{RecipeStore, StoreConfig};
//!
//! let store = RecipeStore::offline(StoreConfig {
//!     path: "./recipes".into(),
//!     ..Default::default()
//! });
//!
//! store.open().await?;
//! store.add_item("Soup", "Hot soup", image_bytes).await?;
//!
//! for item in store.get_all_items().await? {
//!     println!("{} -> {}", item.recipe.title, item.image_url);
//! }
//! ```

pub mod blobs;
pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod mirror;
pub mod records;
pub mod repository;
pub mod schema;
pub mod types;

// Re-exports
pub use blobs::BlobStorage;
pub use config::Config;
pub use database::{Database, StoreConfig, StoreStats};
pub use display::{image_url, DisplayRecipe, ImageUrl, DISPLAY_CONTENT_TYPE};
pub use error::{Result, StoreError};
pub use mirror::{HttpMirror, MirrorConfig, NoopMirror, RemoteMirror, MIRROR_IMAGE_CONTENT_TYPE};
pub use records::{RecordIndex, RecordLog};
pub use repository::{RecipeStore, StoreState};
pub use schema::{OpenState, Schema};
pub use types::*;
