//! Converts stored image bytes into a displayable reference.
//!
//! The reference is a self-contained `data:` URL, so it can be handed to any
//! renderer without the store staying alive.

use crate::error::{Result, StoreError};
use crate::types::Recipe;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// Content type images are presented with.
pub const DISPLAY_CONTENT_TYPE: &str = "image/jpeg";

/// A displayable reference to an image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUrl(String);

impl ImageUrl {
    /// Wrap image bytes as a data URL with the given content type.
    pub fn from_bytes(bytes: &[u8], content_type: &str) -> Self {
        ImageUrl(format!("data:{content_type};base64,{}", STANDARD.encode(bytes)))
    }

    /// The URL as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content type declared by the URL.
    pub fn content_type(&self) -> Option<&str> {
        self.0
            .strip_prefix("data:")?
            .split_once(";base64,")
            .map(|(content_type, _)| content_type)
    }

    /// Recover the image bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let (_, payload) = self
            .0
            .split_once(";base64,")
            .ok_or_else(|| StoreError::Deserialization("not a base64 data URL".into()))?;
        STANDARD
            .decode(payload)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

impl fmt::Debug for ImageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Images can be large; show only the header.
        let head: String = self.0.chars().take(32).collect();
        write!(f, "ImageUrl({head}...)")
    }
}

impl fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recipe together with its derived, non-persisted image reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayRecipe {
    pub recipe: Recipe,
    pub image_url: ImageUrl,
}

impl From<Recipe> for DisplayRecipe {
    fn from(recipe: Recipe) -> Self {
        let image_url = image_url(&recipe.image);
        Self { recipe, image_url }
    }
}

/// Derive the display reference for stored image bytes.
pub fn image_url(image: &[u8]) -> ImageUrl {
    ImageUrl::from_bytes(image, DISPLAY_CONTENT_TYPE)
}
