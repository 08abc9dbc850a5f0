//! Memory query: kNN search, graph expansion, and blob assembly (C8).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::blob::BlobStore;
use crate::capability::{EmbeddingClient, EncryptionClient};
use crate::coordinator::IndexCoordinator;
use crate::error::Result;
use crate::types::{BlobId, UserId, VectorId};

/// Graph expansion hop count for query candidate gathering (§4.6 step 3).
const MAX_HOPS: usize = 1;

/// One retrieved memory, decrypted and ready to hand back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryContent {
    /// The vector id that introduced this memory.
    pub vector_id: VectorId,
    /// The blob id the content was stored under.
    pub blob_id: BlobId,
    /// Caller-supplied category from ingest time.
    pub category: String,
    /// Decrypted content bytes.
    pub content: Vec<u8>,
}

/// Orchestrates kNN search, graph-augmented expansion, and blob fetch for
/// a query.
pub struct MemoryQuery {
    coordinator: Arc<IndexCoordinator>,
    embedding: Arc<dyn EmbeddingClient>,
    encryption: Arc<dyn EncryptionClient>,
    blobs: Arc<dyn BlobStore>,
}

impl MemoryQuery {
    /// Builds a query pipeline over the given collaborators.
    pub fn new(
        coordinator: Arc<IndexCoordinator>,
        embedding: Arc<dyn EmbeddingClient>,
        encryption: Arc<dyn EncryptionClient>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            coordinator,
            embedding,
            encryption,
            blobs,
        }
    }

    /// Finds up to `k` memories relevant to `query` for `user` (§4.6).
    #[instrument(skip(self, query))]
    pub async fn find_relevant(&self, query: &str, user: &UserId, k: usize) -> Result<Vec<MemoryContent>> {
        let q = self.embedding.embed(query).await?;

        // Step 2: oversample for filtering in later steps.
        let hits = self.coordinator.search(user, &q, k * 2).await?;
        let hit_ids: Vec<VectorId> = hits.iter().map(|(id, _)| *id).collect();

        // Step 3-4: expand one hop through the entity graph, then merge
        // with the original hits first and expansion ids second.
        let graph = self.coordinator.graph_clone(user).await?;
        let expanded = graph.expand(&hit_ids, MAX_HOPS);
        let mut candidate_ids = hit_ids.clone();
        for id in expanded {
            if !candidate_ids.contains(&id) {
                candidate_ids.push(id);
            }
        }

        // Steps 5-6: resolve, fetch, decrypt, and assemble up to k results.
        let mut seen_blobs = HashSet::new();
        let mut results = Vec::with_capacity(k.min(candidate_ids.len()));
        for vector_id in candidate_ids {
            if results.len() >= k {
                break;
            }
            let Some(entry) = graph.vector_to_blob.get(&vector_id) else {
                continue;
            };
            if !seen_blobs.insert(entry.blob_id.clone()) {
                continue;
            }
            let ciphertext = match self.blobs.get(&entry.blob_id).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, blob_id = %entry.blob_id, "candidate blob missing, skipping");
                    continue;
                }
            };
            let content = self.encryption.decrypt(&ciphertext, user).await?;
            results.push(MemoryContent {
                vector_id,
                blob_id: entry.blob_id.clone(),
                category: entry.category.clone(),
                content,
            });
        }

        Ok(results)
    }
}
