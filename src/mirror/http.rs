//! HTTP mirror speaking the remote `/recipes` API.

use crate::error::Result;
use crate::mirror::RemoteMirror;
use crate::types::{Recipe, RecordId};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Content type of the image part sent to the remote API.
pub const MIRROR_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Remote mirror configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Base URL of the remote API, without the `/recipes` path.
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Mirror posting creates as multipart forms and deletes by id.
///
/// Response bodies are never parsed. A non-success status is logged and
/// otherwise ignored; only transport failures are returned as errors.
pub struct HttpMirror {
    client: Client,
    base_url: String,
}

impl HttpMirror {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn recipes_url(&self) -> String {
        format!("{}/recipes", self.base_url)
    }

    fn recipe_url(&self, id: RecordId) -> String {
        format!("{}/recipes/{}", self.base_url, id)
    }
}

#[async_trait]
impl RemoteMirror for HttpMirror {
    async fn create(&self, recipe: &Recipe) -> Result<()> {
        let image = Part::bytes(recipe.image.clone())
            .file_name("image")
            .mime_str(MIRROR_IMAGE_CONTENT_TYPE)?;

        let form = Form::new()
            .text("title", recipe.title.clone())
            .text("description", recipe.description.clone())
            .part("image", image);

        let response = self
            .client
            .post(self.recipes_url())
            .multipart(form)
            .send()
            .await
            .inspect_err(|e| tracing::warn!(id = %recipe.id, "mirror create failed: {e}"))?;

        if !response.status().is_success() {
            tracing::warn!(id = %recipe.id, status = %response.status(), "mirror create rejected");
        }

        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        let response = self
            .client
            .delete(self.recipe_url(id))
            .send()
            .await
            .inspect_err(|e| tracing::warn!(%id, "mirror delete failed: {e}"))?;

        if !response.status().is_success() {
            tracing::warn!(%id, status = %response.status(), "mirror delete rejected");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let mirror = HttpMirror::new(&MirrorConfig {
            base_url: "http://example.test/api/".into(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(mirror.recipes_url(), "http://example.test/api/recipes");
        assert_eq!(mirror.recipe_url(RecordId(42)), "http://example.test/api/recipes/42");
    }
}
