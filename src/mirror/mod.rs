//! Best-effort mirroring of local writes to a remote recipe API.
//!
//! The mirror holds an independent copy that is only told about creates and
//! deletes. A mirror failure never undoes the local write.

mod http;

pub use http::{HttpMirror, MirrorConfig, MIRROR_IMAGE_CONTENT_TYPE};

use crate::error::Result;
use crate::types::{Recipe, RecordId};
use async_trait::async_trait;

/// Receiver of created and deleted recipes.
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Announce a recipe written locally.
    async fn create(&self, recipe: &Recipe) -> Result<()>;

    /// Announce a recipe deleted locally.
    async fn delete(&self, id: RecordId) -> Result<()>;
}

/// Mirror that drops every call, for offline use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMirror;

#[async_trait]
impl RemoteMirror for NoopMirror {
    async fn create(&self, _recipe: &Recipe) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _id: RecordId) -> Result<()> {
        Ok(())
    }
}
