//! # mnemo
//!
//! Embedded personal memory layer for conversational assistants — batched
//! HNSW recall with graph-augmented retrieval, a content-addressed blob
//! store, and an on-chain-backed per-user index lifecycle.
//!
//! `mnemo` provides persistent, per-user memory storage: semantic search
//! over a user's past conversational content, augmented by a lightweight
//! entity graph so that retrieval surfaces related memories, not just
//! near neighbours in embedding space.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mnemo::{Mnemo, Config};
//! use std::sync::Arc;
//!
//! // Open with your embedding/extraction/encryption/on-chain providers.
//! let mnemo = Mnemo::open(
//!     Config::default(),
//!     embedding_client,
//!     extraction_client,
//!     encryption_client,
//!     onchain_client,
//!     remote_blob_backend,
//!     None,
//! ).await?;
//!
//! let user = UserId::new("u-alice");
//! let result = mnemo.ingest("I love pizza", "preference", &user, None).await?;
//! let hits = mnemo.query("what do I love", &user, 5).await?;
//!
//! mnemo.close().await?;
//! ```
//!
//! ## Key Concepts
//!
//! ### User
//!
//! A **user** is the isolation unit for memory: each user gets their own
//! HNSW index, entity graph, and on-chain pointer. `mnemo` does not
//! authenticate callers — you provide the user id (wallet address, API
//! key, whatever fits your system).
//!
//! ### Memory
//!
//! A **memory** is a unit of recorded content. Ingest embeds it, extracts
//! any entities and relationships it mentions, absorbs the vector into
//! the user's HNSW index, and stores the encrypted content as a blob.
//!
//! ### External Collaborators
//!
//! `mnemo` never implements embedding, entity extraction, encryption, or
//! on-chain lookups itself — these cross a process or network boundary
//! and are expressed as capability traits in [`capability`] that you
//! implement against your own providers.
//!
//! ## Thread Safety
//!
//! `Mnemo` is `Send + Sync` and can be shared across threads using `Arc`.
//! Per-user state is protected by a per-user lock; there is at most one
//! in-flight writer per user at a time.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod coordinator;
mod error;
mod ingest;
mod query;
mod storage;
mod types;

pub mod blob;
pub mod capability;
pub mod config;
pub mod graph;
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

pub use config::{Config, HnswConfig};
pub use error::{BlobError, GraphError, MemError, Result, StorageError};
pub use ingest::NewMemory;
pub use query::MemoryContent;
pub use types::{BlobId, MemoryId, Timestamp, UserId, Vector, VectorId};

pub use coordinator::{BatchStats, UserBatchStats, UserStatus};

// ============================================================================
// Facade
// ============================================================================

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument};

use blob::{BlobStore, LocalBackend, RemoteBackend, RoutingBlobStore};
use capability::{EmbeddingClient, EncryptionClient, ExtractionClient, OnChainLookup, PublicationHook};
use coordinator::IndexCoordinator;
use ingest::MemoryIngest;
use query::MemoryQuery;
use storage::BookkeepingStore;

/// The main memory-layer handle.
///
/// Create an instance with [`Mnemo::open`] and release its background
/// tasks with [`Mnemo::close`].
///
/// # Ownership
///
/// `Mnemo` owns its coordinator, blob store, and background flush/eviction
/// tasks. `close()` consumes the handle, aborts the background tasks, and
/// flushes every dirty user before returning.
pub struct Mnemo {
    config: Config,
    coordinator: Arc<IndexCoordinator>,
    ingest: MemoryIngest,
    query: MemoryQuery,
    flush_task: JoinHandle<()>,
    eviction_task: JoinHandle<()>,
}

impl std::fmt::Debug for Mnemo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mnemo").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Mnemo {
    /// Opens a memory layer over the given configuration and external
    /// collaborators, and starts the flush scheduler and eviction sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`Config::validate`] or the
    /// bookkeeping database cannot be opened (e.g. a schema version
    /// mismatch, see [`StorageError::SchemaVersionMismatch`]).
    #[instrument(skip(
        config,
        embedding,
        extraction,
        encryption,
        onchain,
        remote,
        publication_hook
    ))]
    pub async fn open(
        config: Config,
        embedding: Arc<dyn EmbeddingClient>,
        extraction: Arc<dyn ExtractionClient>,
        encryption: Arc<dyn EncryptionClient>,
        onchain: Arc<dyn OnChainLookup>,
        remote: Box<dyn RemoteBackend>,
        publication_hook: Option<Arc<dyn PublicationHook>>,
    ) -> Result<Self> {
        config.validate()?;

        info!("opening mnemo");

        let local = LocalBackend::new(config.local_blob_dir.clone());
        let routing = RoutingBlobStore::new(remote, local, config.liveness_check_interval);
        let blobs: Arc<dyn BlobStore> = Arc::new(routing);

        let bookkeeping = Arc::new(BookkeepingStore::open(&config.bookkeeping_path)?);

        let coordinator = Arc::new(IndexCoordinator::new(
            config.clone(),
            Arc::clone(&blobs),
            bookkeeping,
            onchain,
            publication_hook,
        ));

        let ingest = MemoryIngest::new(
            Arc::clone(&coordinator),
            Arc::clone(&embedding),
            extraction,
            Arc::clone(&encryption),
            Arc::clone(&blobs),
        );
        let query = MemoryQuery::new(Arc::clone(&coordinator), embedding, encryption, blobs);

        let flush_task = spawn_tick(Arc::clone(&coordinator), config.scheduler_tick, |c| {
            Box::pin(async move { c.run_flush_tick().await })
        });
        let eviction_task = spawn_tick(Arc::clone(&coordinator), config.eviction_tick, |c| {
            Box::pin(async move { c.run_eviction_tick().await })
        });

        info!(
            batch_delay = ?config.batch_delay,
            max_batch = config.max_batch,
            "mnemo opened"
        );

        Ok(Self {
            config,
            coordinator,
            ingest,
            query,
            flush_task,
            eviction_task,
        })
    }

    /// Stops the background flush/eviction tasks and flushes every dirty
    /// user's pending writes before returning.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<()> {
        info!("closing mnemo");
        self.flush_task.abort();
        self.eviction_task.abort();

        let stats = self.coordinator.batch_stats().await;
        for (user, user_stats) in stats.users {
            if user_stats.dirty {
                self.coordinator.force_flush(&user).await?;
            }
        }

        info!("mnemo closed");
        Ok(())
    }

    /// Returns the configuration this handle was opened with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates empty index and graph blobs for `user` if none exist yet
    /// (§4.4's `prepare_index`). Idempotent while `Preparing` or `Active`.
    pub async fn prepare(&self, user: &UserId) -> Result<(BlobId, BlobId)> {
        self.coordinator.prepare(user).await
    }

    /// Binds `on_chain_id` to `user`, verifying ownership through the
    /// on-chain collaborator (§4.4's `register_index`).
    pub async fn register(&self, user: &UserId, on_chain_id: &str) -> Result<()> {
        self.coordinator.register(user, on_chain_id).await
    }

    /// Embeds, extracts, absorbs, and stores a new memory (§4.5).
    pub async fn ingest(
        &self,
        content: &str,
        category: impl Into<String>,
        user: &UserId,
        memory_id: Option<MemoryId>,
    ) -> Result<NewMemory> {
        self.ingest.process_new_memory(content, category, user, memory_id).await
    }

    /// Finds up to `k` memories relevant to `text` for `user` (§4.6).
    pub async fn query(&self, text: &str, user: &UserId, k: usize) -> Result<Vec<MemoryContent>> {
        self.query.find_relevant(text, user, k).await
    }

    /// Drains `user`'s pending writes and publishes a new version.
    pub async fn force_flush(&self, user: &UserId) -> Result<(BlobId, u64)> {
        self.coordinator.force_flush(user).await
    }

    /// Observability snapshot: per-user pending counts, cache entries, and
    /// active flush jobs.
    pub async fn batch_stats(&self) -> BatchStats {
        self.coordinator.batch_stats().await
    }
}

fn spawn_tick<F>(coordinator: Arc<IndexCoordinator>, interval: std::time::Duration, tick: F) -> JoinHandle<()>
where
    F: Fn(Arc<IndexCoordinator>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            tick(Arc::clone(&coordinator)).await;
        }
    })
}

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common `mnemo` usage.
///
/// ```rust
/// use mnemo::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{MemError, Result};
    pub use crate::ingest::NewMemory;
    pub use crate::query::MemoryContent;
    pub use crate::types::{BlobId, MemoryId, UserId, VectorId};
    pub use crate::Mnemo;
}
