//! Memory ingest: embed, extract, absorb, and store a new memory (C7).

use std::sync::Arc;

use tracing::instrument;

use crate::blob::{BlobStore, BlobTags};
use crate::capability::{EmbeddingClient, EncryptionClient, ExtractionClient};
use crate::coordinator::IndexCoordinator;
use crate::error::Result;
use crate::graph::sanitise_entity_id;
use crate::types::{BlobId, MemoryId, UserId, VectorId};

/// Result of [`MemoryIngest::process_new_memory`] (§4.5 step 9).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMemory {
    /// Caller-supplied or freshly minted temporary id.
    pub memory_id: MemoryId,
    /// Link into the HNSW engine.
    pub vector_id: VectorId,
    /// Link to the stored ciphertext.
    pub blob_id: BlobId,
}

/// Orchestrates embed + extract + absorb + blob-store for a new memory.
pub struct MemoryIngest {
    coordinator: Arc<IndexCoordinator>,
    embedding: Arc<dyn EmbeddingClient>,
    extraction: Arc<dyn ExtractionClient>,
    encryption: Arc<dyn EncryptionClient>,
    blobs: Arc<dyn BlobStore>,
}

impl MemoryIngest {
    /// Builds an ingest pipeline over the given collaborators.
    pub fn new(
        coordinator: Arc<IndexCoordinator>,
        embedding: Arc<dyn EmbeddingClient>,
        extraction: Arc<dyn ExtractionClient>,
        encryption: Arc<dyn EncryptionClient>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            coordinator,
            embedding,
            extraction,
            encryption,
            blobs,
        }
    }

    /// Runs the full ingest pipeline for one piece of content (§4.5).
    ///
    /// Errors at any step surface directly to the caller. If step 5 (the
    /// HNSW absorb) has already succeeded when a later step fails, the
    /// vector stays pending — it becomes searchable on the next flush but
    /// has no retrievable content until the caller re-submits. The engine
    /// does not try to roll that back.
    #[instrument(skip(self, content, category))]
    pub async fn process_new_memory(
        &self,
        content: &str,
        category: impl Into<String>,
        user: &UserId,
        memory_id: Option<MemoryId>,
    ) -> Result<NewMemory> {
        let category = category.into();

        // Step 1: eager transition to Preparing if this is the user's
        // first memory; idempotent otherwise.
        self.coordinator.prepare(user).await?;

        // Steps 2-3: embed and extract are independent of each other and
        // of the coordinator state, but run sequentially here since most
        // extraction providers are cheap relative to embedding latency
        // and a single await chain keeps error attribution simple.
        let vector = self.embedding.embed(content).await?;
        let extraction = self.extraction.extract(content).await?;

        // Step 4-5: allocate the next id and absorb the vector.
        let vector_id = self.coordinator.allocate_vector_id(user).await?;
        self.coordinator.add_vector(user, vector_id, vector).await?;

        // Step 6: merge the graph and index the entities this memory
        // introduced, using the same sanitised ids `merge` assigns.
        self.coordinator
            .merge_graph(user, &extraction.entities, &extraction.relationships)
            .await?;
        let entity_ids: Vec<String> = extraction
            .entities
            .iter()
            .map(|e| sanitise_entity_id(&e.id))
            .collect();
        self.coordinator.index_entities(user, entity_ids, vector_id).await?;

        // Step 7: encrypt and store the content.
        let ciphertext = self.encryption.encrypt(content.as_bytes(), user).await?;
        let mut tags = BlobTags::new();
        tags.insert("owner".to_string(), user.as_str().to_string());
        tags.insert("content-type".to_string(), "application/octet-stream".to_string());
        tags.insert("category".to_string(), category.clone());
        let blob_id = self.blobs.put(&ciphertext, tags).await?;

        // Step 8: record the vector_id -> blob_id mapping for the next
        // flush to serialise into the graph blob.
        self.coordinator
            .record_blob(user, vector_id, blob_id.clone(), category)
            .await?;

        // Step 9.
        let memory_id = memory_id.unwrap_or_else(MemoryId::new_temporary);
        Ok(NewMemory {
            memory_id,
            vector_id,
            blob_id,
        })
    }
}
