//! Persistence for [`PerUserGraph`] through a [`BlobStore`].

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::blob::{BlobStore, BlobTags};
use crate::error::{GraphError, Result};
use crate::graph::PerUserGraph;
use crate::types::{BlobId, UserId};

/// Loads and saves a user's graph blob.
pub struct GraphStore {
    blobs: Arc<dyn BlobStore>,
}

impl GraphStore {
    /// Wraps `blobs` as the backing content-addressed store.
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Loads the graph stored at `blob_id`. A missing or corrupt blob
    /// yields an empty graph rather than failing the caller outright,
    /// since a freshly provisioned user has no graph blob yet.
    #[instrument(skip(self))]
    pub async fn load(&self, blob_id: Option<&BlobId>) -> Result<PerUserGraph> {
        let Some(blob_id) = blob_id else {
            return Ok(PerUserGraph::empty());
        };
        let bytes = self.blobs.get(blob_id).await?;
        PerUserGraph::from_json_bytes(&bytes).or_else(|e| {
            warn!(error = %e, %blob_id, "graph blob failed to parse, starting from empty graph");
            Ok(PerUserGraph::empty())
        })
    }

    /// Serialises `graph` and stores it as a fresh blob, returning its id.
    #[instrument(skip(self, graph))]
    pub async fn save(&self, graph: &PerUserGraph, owner: &UserId) -> Result<BlobId> {
        let bytes = graph
            .to_json_bytes()
            .map_err(|e| GraphError::SerialiseFailure(e.to_string()))?;
        let mut tags = BlobTags::new();
        tags.insert("owner".to_string(), owner.as_str().to_string());
        tags.insert("content-type".to_string(), "application/json".to_string());
        self.blobs.put(&bytes, tags).await
    }
}
