//! Configuration loaded from a TOML file.
//!
//! ```toml
//! [store]
//! path = "./recipes"
//! name = "recipes"
//! version = 1
//! secondary_indexes = false
//!
//! [mirror]
//! base_url = "http://localhost:3000"
//! timeout_secs = 30
//! ```
//!
//! Missing fields take their defaults; a missing `[mirror]` section means
//! the store runs offline.

use crate::database::StoreConfig;
use crate::error::{Result, StoreError};
use crate::mirror::MirrorConfig;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub mirror: Option<MirrorConfig>,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}
