//! External capability traits.
//!
//! Everything the core treats as an outside collaborator — embedding
//! computation, entity extraction, payload encryption, and on-chain lookups
//! — is expressed as a narrow `async` trait here. The core never implements
//! these beyond the no-op [`NoopEncryption`] demo-mode default; production
//! callers wire in their own embedding service, extraction model, KMS, and
//! chain client.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{UserId, Vector};

/// Text → fixed-dimensional vector (C2).
///
/// The dimension `D` is fixed by the provider, not negotiated by the core;
/// the first vector a user ever submits pins `D` for that user (§4.3).
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vector>;
}

/// An entity discovered by the extraction client.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtractedEntity {
    /// Stable identifier as produced by the extractor (sanitised on merge,
    /// see [`crate::graph::sanitise_entity_id`]).
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Free-form entity type/category.
    pub entity_type: String,
}

/// A relationship discovered by the extraction client.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtractedRelationship {
    /// Source entity id (pre-sanitisation).
    pub source: String,
    /// Target entity id (pre-sanitisation).
    pub target: String,
    /// Edge label.
    pub label: String,
}

/// Output of a single extraction call.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Extraction {
    /// Entities mentioned in the source text.
    pub entities: Vec<ExtractedEntity>,
    /// Relationships between those entities.
    pub relationships: Vec<ExtractedRelationship>,
}

/// Text → (entities, relationships) (C3).
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Extracts entities and relationships mentioned in `text`.
    async fn extract(&self, text: &str) -> Result<Extraction>;
}

/// Payload encryption for blob contents.
///
/// May be identity in demo mode — see [`NoopEncryption`].
#[async_trait]
pub trait EncryptionClient: Send + Sync {
    /// Encrypts `plaintext` on behalf of `owner` before it is written to
    /// the blob store.
    async fn encrypt(&self, plaintext: &[u8], owner: &UserId) -> Result<Vec<u8>>;

    /// Decrypts `ciphertext` read back from the blob store on behalf of
    /// `owner`.
    async fn decrypt(&self, ciphertext: &[u8], owner: &UserId) -> Result<Vec<u8>>;
}

/// Identity encryption, valid for tests and explicit demo-mode deployments.
///
/// Ciphertext is the plaintext byte-for-byte; `owner` is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEncryption;

#[async_trait]
impl EncryptionClient for NoopEncryption {
    async fn encrypt(&self, plaintext: &[u8], _owner: &UserId) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    async fn decrypt(&self, ciphertext: &[u8], _owner: &UserId) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// The on-chain memory-index pointer for a user, as published by a prior
/// flush (§4.4).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OnChainPointer {
    /// The on-chain object id bound to this user.
    pub on_chain_id: String,
    /// Published index version.
    pub version: u64,
    /// Index blob id as of `version`.
    pub index_blob_id: String,
    /// Graph blob id as of `version`.
    pub graph_blob_id: String,
}

/// On-chain ownership and pointer lookups (consumed capability).
#[async_trait]
pub trait OnChainLookup: Send + Sync {
    /// Resolves the user that owns `on_chain_id`.
    async fn owner_of(&self, on_chain_id: &str) -> Result<UserId>;

    /// Fetches the current published memory-index pointer for `user`, if
    /// one has ever been registered.
    async fn memory_index_for(&self, user: &UserId) -> Result<Option<OnChainPointer>>;
}

/// Receives `(user, index_blob_id, graph_blob_id, version)` after a
/// successful flush (§4.4's publication callback). The trait has no
/// `Result`: a failure on the collaborator's side must not invalidate
/// the coordinator's in-memory state, so there is nothing for the
/// coordinator to propagate — the next successful flush carries the
/// latest blob ids regardless.
#[async_trait]
pub trait PublicationHook: Send + Sync {
    /// Called after the coordinator publishes a new version for `user`.
    async fn on_published(&self, user: &UserId, index_blob_id: &str, graph_blob_id: &str, version: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_encryption_is_identity() {
        let enc = NoopEncryption;
        let owner = UserId::new("u-alice");
        let plaintext = b"I love pizza".to_vec();
        let ciphertext = enc.encrypt(&plaintext, &owner).await.unwrap();
        assert_eq!(ciphertext, plaintext);
        let decrypted = enc.decrypt(&ciphertext, &owner).await.unwrap();
        assert_eq!(decrypted, plaintext);
    }
}
