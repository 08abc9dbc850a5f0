//! Per-user index lifecycle: prepare, register, load, flush, evict (C6).
//!
//! Holds the `UserIndexState` map, the per-user locks, the flush scheduler
//! tick, and the cache-eviction sweep. Two process-wide background tasks
//! (driven by `tokio::time::interval` in the [`crate::Mnemo`] facade) call
//! [`IndexCoordinator::run_flush_tick`] and
//! [`IndexCoordinator::run_eviction_tick`] respectively.

mod state;

pub use state::{UserIndexState, UserStatus};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::blob::{BlobStore, BlobTags};
use crate::capability::{
    ExtractedEntity, ExtractedRelationship, OnChainLookup, OnChainPointer, PublicationHook,
};
use crate::config::Config;
use crate::error::{MemError, Result};
use crate::graph::{GraphStore, PerUserGraph};
use crate::storage::BookkeepingStore;
use crate::types::{BlobId, UserId, Vector, VectorId};
use crate::vector::{IndexSnapshot, PerUserIndex};

use state::UserCell;

/// Observability snapshot for one user (`batch_stats()`, §6).
#[derive(Clone, Debug)]
pub struct UserBatchStats {
    pub pending: usize,
    pub version: u64,
    pub dirty: bool,
}

/// Process-wide observability snapshot (§6).
#[derive(Clone, Debug, Default)]
pub struct BatchStats {
    pub users: HashMap<UserId, UserBatchStats>,
    pub cache_entries: usize,
    pub active_flush_jobs: usize,
}

/// Coordinates per-user index lifecycle and batching.
pub struct IndexCoordinator {
    config: Config,
    blobs: Arc<dyn BlobStore>,
    graph_store: GraphStore,
    bookkeeping: Arc<BookkeepingStore>,
    onchain: Arc<dyn OnChainLookup>,
    publication_hook: Option<Arc<dyn PublicationHook>>,
    users: RwLock<HashMap<UserId, Arc<UserCell>>>,
}

impl IndexCoordinator {
    /// Builds a coordinator over the given collaborators.
    pub fn new(
        config: Config,
        blobs: Arc<dyn BlobStore>,
        bookkeeping: Arc<BookkeepingStore>,
        onchain: Arc<dyn OnChainLookup>,
        publication_hook: Option<Arc<dyn PublicationHook>>,
    ) -> Self {
        let graph_store = GraphStore::new(Arc::clone(&blobs));
        Self {
            config,
            blobs,
            graph_store,
            bookkeeping,
            onchain,
            publication_hook,
            users: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create_cell(&self, user: &UserId) -> Arc<UserCell> {
        if let Some(cell) = self.users.read().expect("users lock poisoned").get(user) {
            return Arc::clone(cell);
        }
        let mut users = self.users.write().expect("users lock poisoned");
        Arc::clone(
            users
                .entry(user.clone())
                .or_insert_with(|| Arc::new(UserCell::absent())),
        )
    }

    /// Returns the cached cell for `user`, attempting a cold hydration from
    /// a known on-chain pointer (bookkeeping cache, then the on-chain
    /// collaborator) if nothing is cached yet (§4.4's `get_or_load`).
    #[instrument(skip(self))]
    async fn load_cell(&self, user: &UserId) -> Result<Arc<UserCell>> {
        let cell = self.get_or_create_cell(user);
        {
            let state = cell.state.lock().await;
            if state.status != UserStatus::Absent {
                return Ok(Arc::clone(&cell));
            }
        }

        let pointer = match self.bookkeeping.get_pointer(user)? {
            Some(p) => Some(p),
            None => self.onchain.memory_index_for(user).await?,
        };

        if let Some(pointer) = pointer {
            debug!(%user, "hydrating user state from on-chain pointer");
            let index_blob_id = BlobId::new(pointer.index_blob_id.clone());
            let graph_blob_id = BlobId::new(pointer.graph_blob_id.clone());
            let index_bytes = self.blobs.get(&index_blob_id).await?;
            let snapshot = IndexSnapshot::from_bytes(&index_bytes)?;
            let vector_index = PerUserIndex::hydrate(self.config.hnsw.clone(), snapshot);
            let graph = self.graph_store.load(Some(&graph_blob_id)).await?;

            let mut state = cell.state.lock().await;
            if state.status == UserStatus::Absent {
                state.vector_index = Some(vector_index);
                state.graph = Some(graph);
                state.index_blob_id = Some(index_blob_id);
                state.graph_blob_id = Some(graph_blob_id);
                state.on_chain_id = Some(pointer.on_chain_id);
                state.version = pointer.version;
                state.status = UserStatus::Active;
                state.last_modified_at = Instant::now();
            }
        }

        Ok(cell)
    }

    fn index_blob_tags(&self, user: &UserId) -> BlobTags {
        let mut tags = BlobTags::new();
        tags.insert("owner".to_string(), user.as_str().to_string());
        tags.insert("content-type".to_string(), "application/octet-stream".to_string());
        tags
    }

    /// Creates empty index and graph blobs for `user` if none exist yet.
    /// Idempotent while `Preparing` or `Active` (§4.4).
    #[instrument(skip(self))]
    pub async fn prepare(&self, user: &UserId) -> Result<(BlobId, BlobId)> {
        let cell = self.load_cell(user).await?;
        {
            let state = cell.state.lock().await;
            if let (Some(index_blob_id), Some(graph_blob_id)) = (&state.index_blob_id, &state.graph_blob_id) {
                return Ok((index_blob_id.clone(), graph_blob_id.clone()));
            }
        }

        let vector_index = PerUserIndex::empty(self.config.hnsw.clone());
        let snapshot = vector_index.force_flush()?;
        let index_bytes = snapshot.to_bytes()?;
        let index_blob_id = self.blobs.put(&index_bytes, self.index_blob_tags(user)).await?;

        let graph = PerUserGraph::empty();
        let graph_blob_id = self.graph_store.save(&graph, user).await?;

        let mut state = cell.state.lock().await;
        if state.index_blob_id.is_some() {
            // Lost a race with a concurrent `prepare` — keep the winner.
            return Ok((
                state.index_blob_id.clone().unwrap(),
                state.graph_blob_id.clone().unwrap(),
            ));
        }
        state.vector_index = Some(vector_index);
        state.graph = Some(graph);
        state.index_blob_id = Some(index_blob_id.clone());
        state.graph_blob_id = Some(graph_blob_id.clone());
        state.status = UserStatus::Preparing;
        state.last_modified_at = Instant::now();
        Ok((index_blob_id, graph_blob_id))
    }

    /// Binds `on_chain_id` to `user` after verifying ownership through the
    /// on-chain collaborator, transitioning the user to `Active` (§4.4).
    #[instrument(skip(self))]
    pub async fn register(&self, user: &UserId, on_chain_id: &str) -> Result<()> {
        let owner = self.onchain.owner_of(on_chain_id).await?;
        if &owner != user {
            return Err(MemError::unauthorised(format!(
                "on-chain id {on_chain_id} is owned by {owner}, not {user}"
            )));
        }

        let cell = self.get_or_create_cell(user);
        let (version, index_blob_id, graph_blob_id) = {
            let mut state = cell.state.lock().await;
            state.on_chain_id = Some(on_chain_id.to_string());
            if state.version == 0 {
                state.version = 1;
            }
            state.status = UserStatus::Active;
            (state.version, state.index_blob_id.clone(), state.graph_blob_id.clone())
        };

        if let (Some(index_blob_id), Some(graph_blob_id)) = (index_blob_id, graph_blob_id) {
            self.bookkeeping.put_pointer(
                user,
                &OnChainPointer {
                    on_chain_id: on_chain_id.to_string(),
                    version,
                    index_blob_id: index_blob_id.to_string(),
                    graph_blob_id: graph_blob_id.to_string(),
                },
            )?;
        }

        Ok(())
    }

    /// Absorbs `vector` under `vector_id` for `user`, scheduling or
    /// triggering a flush per the batching rules (§4.3).
    pub async fn add_vector(&self, user: &UserId, vector_id: VectorId, vector: Vector) -> Result<()> {
        let cell = self.load_cell(user).await?;
        let should_flush = {
            let mut state = cell.state.lock().await;
            if state.vector_index.is_none() {
                state.vector_index = Some(PerUserIndex::empty(self.config.hnsw.clone()));
            }
            state.vector_index.as_ref().unwrap().add_batched(vector_id, vector)?;
            if state.flush_scheduled_at.is_none() {
                state.flush_scheduled_at = Some(Instant::now());
            }
            state.dirty = true;
            state.last_modified_at = Instant::now();
            state.pending_len() >= self.config.max_batch
        };
        if should_flush {
            self.force_flush(user).await?;
        }
        Ok(())
    }

    /// Searches `user`'s committed index layered with pending writes.
    pub async fn search(&self, user: &UserId, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>> {
        let cell = self.load_cell(user).await?;
        let state = cell.state.lock().await;
        match &state.vector_index {
            Some(idx) => idx.search(query, k),
            None => Ok(Vec::new()),
        }
    }

    /// Returns a clone of `user`'s current graph (empty if none cached).
    pub async fn graph_clone(&self, user: &UserId) -> Result<PerUserGraph> {
        let cell = self.load_cell(user).await?;
        let state = cell.state.lock().await;
        Ok(state.graph.clone().unwrap_or_else(PerUserGraph::empty))
    }

    /// Merges freshly extracted entities/relationships into `user`'s graph.
    pub async fn merge_graph(
        &self,
        user: &UserId,
        entities: &[ExtractedEntity],
        relationships: &[ExtractedRelationship],
    ) -> Result<()> {
        let cell = self.load_cell(user).await?;
        let mut state = cell.state.lock().await;
        let current = state.graph.clone().unwrap_or_else(PerUserGraph::empty);
        state.graph = Some(current.merge(entities, relationships));
        state.dirty = true;
        state.last_modified_at = Instant::now();
        Ok(())
    }

    /// Records that `entity_ids` were introduced by `vector_id`.
    pub async fn index_entities(&self, user: &UserId, entity_ids: Vec<String>, vector_id: VectorId) -> Result<()> {
        let cell = self.load_cell(user).await?;
        let mut state = cell.state.lock().await;
        state
            .graph
            .get_or_insert_with(PerUserGraph::empty)
            .index_entities(entity_ids, vector_id);
        state.dirty = true;
        Ok(())
    }

    /// Records the `(blob_id, category)` for `vector_id`.
    pub async fn record_blob(&self, user: &UserId, vector_id: VectorId, blob_id: BlobId, category: String) -> Result<()> {
        let cell = self.load_cell(user).await?;
        let mut state = cell.state.lock().await;
        state
            .graph
            .get_or_insert_with(PerUserGraph::empty)
            .record_blob(vector_id, blob_id, category);
        state.dirty = true;
        Ok(())
    }

    /// Allocates the next monotone vector id for `user`.
    pub async fn allocate_vector_id(&self, user: &UserId) -> Result<VectorId> {
        let cell = self.load_cell(user).await?;
        let mut state = cell.state.lock().await;
        Ok(state.graph.get_or_insert_with(PerUserGraph::empty).allocate_vector_id())
    }

    /// Drains `user`'s pending vectors into the committed index, publishes
    /// a new index blob and graph blob, and bumps the version (§4.3 steps
    /// 3-6).
    #[instrument(skip(self))]
    pub async fn force_flush(&self, user: &UserId) -> Result<(BlobId, u64)> {
        let cell = self.load_cell(user).await?;
        let mut state = cell.state.lock().await;

        let snapshot = {
            let idx = state
                .vector_index
                .as_ref()
                .ok_or_else(|| MemError::not_found(format!("no index cached for {user}")))?;
            idx.force_flush()?
        };
        let index_bytes = snapshot.to_bytes()?;
        let new_index_blob_id = self.blobs.put(&index_bytes, self.index_blob_tags(user)).await?;

        let graph = state.graph.clone().unwrap_or_else(PerUserGraph::empty);
        let new_graph_blob_id = self.graph_store.save(&graph, user).await?;

        let pending_remaining = state.vector_index.as_ref().map_or(0, |v| v.pending_len());
        state.index_blob_id = Some(new_index_blob_id.clone());
        state.graph_blob_id = Some(new_graph_blob_id.clone());
        state.version += 1;
        state.dirty = pending_remaining > 0;
        state.flush_scheduled_at = if state.dirty { Some(Instant::now()) } else { None };
        state.last_modified_at = Instant::now();
        let version = state.version;
        let on_chain_id = state.on_chain_id.clone();
        drop(state);

        if let Some(on_chain_id) = &on_chain_id {
            self.bookkeeping.put_pointer(
                user,
                &OnChainPointer {
                    on_chain_id: on_chain_id.clone(),
                    version,
                    index_blob_id: new_index_blob_id.to_string(),
                    graph_blob_id: new_graph_blob_id.to_string(),
                },
            )?;
        }

        if let Some(hook) = &self.publication_hook {
            hook.on_published(user, new_index_blob_id.as_str(), new_graph_blob_id.as_str(), version)
                .await;
        }

        Ok((new_index_blob_id, version))
    }

    fn snapshot_cells(&self) -> Vec<(UserId, Arc<UserCell>)> {
        self.users
            .read()
            .expect("users lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    /// Process-wide tick: flushes every user whose flush timer has expired
    /// or whose pending buffer has crossed `max_batch` (§4.4's scheduler).
    pub async fn run_flush_tick(&self) {
        for (user, cell) in self.snapshot_cells() {
            let should_flush = {
                let state = cell.state.lock().await;
                match state.flush_scheduled_at {
                    Some(scheduled_at) => {
                        scheduled_at.elapsed() >= self.config.batch_delay || state.pending_len() >= self.config.max_batch
                    }
                    None => false,
                }
            };
            if should_flush {
                if let Err(e) = self.force_flush(&user).await {
                    warn!(error = %e, %user, "scheduled flush failed");
                }
            }
        }
    }

    /// Process-wide tick: evicts idle, clean cache entries; flushes dirty
    /// ones first (§4.4's eviction sweep).
    pub async fn run_eviction_tick(&self) {
        for (user, cell) in self.snapshot_cells() {
            let (is_stale, is_dirty) = {
                let state = cell.state.lock().await;
                (state.last_modified_at.elapsed() >= self.config.cache_ttl, state.dirty)
            };
            if !is_stale {
                continue;
            }
            if is_dirty {
                if let Err(e) = self.force_flush(&user).await {
                    warn!(error = %e, %user, "pre-eviction flush failed, keeping cache entry");
                    continue;
                }
            }
            self.users.write().expect("users lock poisoned").remove(&user);
            debug!(%user, "evicted idle user cache entry");
        }
    }

    /// Observability snapshot (§6).
    pub async fn batch_stats(&self) -> BatchStats {
        let cells = self.snapshot_cells();
        let mut users = HashMap::with_capacity(cells.len());
        let mut active_flush_jobs = 0;
        for (user, cell) in &cells {
            let state = cell.state.lock().await;
            if state.flush_scheduled_at.is_some() {
                active_flush_jobs += 1;
            }
            users.insert(
                user.clone(),
                UserBatchStats {
                    pending: state.pending_len(),
                    version: state.version,
                    dirty: state.dirty,
                },
            );
        }
        BatchStats {
            cache_entries: cells.len(),
            active_flush_jobs,
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{HttpRemoteBackend, LocalBackend, RoutingBlobStore};
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakeOnChain {
        owners: StdMutex<StdHashMap<String, UserId>>,
    }

    #[async_trait]
    impl OnChainLookup for FakeOnChain {
        async fn owner_of(&self, on_chain_id: &str) -> Result<UserId> {
            self.owners
                .lock()
                .unwrap()
                .get(on_chain_id)
                .cloned()
                .ok_or_else(|| MemError::not_found(on_chain_id))
        }

        async fn memory_index_for(&self, _user: &UserId) -> Result<Option<OnChainPointer>> {
            Ok(None)
        }
    }

    fn test_coordinator() -> (tempfile::TempDir, IndexCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let remote = HttpRemoteBackend::new("http://127.0.0.1:1", Duration::from_millis(1), 12);
        let routing = RoutingBlobStore::new(
            Box::new(remote),
            LocalBackend::new(dir.path().join("blobs")),
            Duration::from_secs(300),
        );
        let bookkeeping = BookkeepingStore::open(dir.path().join("book.redb")).unwrap();
        let onchain = FakeOnChain {
            owners: StdMutex::new(StdHashMap::new()),
        };
        let coordinator = IndexCoordinator::new(
            Config::default(),
            Arc::new(routing),
            Arc::new(bookkeeping),
            Arc::new(onchain),
            None,
        );
        (dir, coordinator)
    }

    #[tokio::test]
    async fn prepare_is_idempotent() {
        let (_dir, coordinator) = test_coordinator();
        let user = UserId::new("u-alice");
        let first = coordinator.prepare(&user).await.unwrap();
        let second = coordinator.prepare(&user).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn add_vector_is_searchable_before_flush() {
        let (_dir, coordinator) = test_coordinator();
        let user = UserId::new("u-alice");
        coordinator.prepare(&user).await.unwrap();

        let id = coordinator.allocate_vector_id(&user).await.unwrap();
        coordinator.add_vector(&user, id, vec![1.0, 0.0, 0.0]).await.unwrap();

        let stats = coordinator.batch_stats().await;
        assert_eq!(stats.users[&user].pending, 1);

        let results = coordinator.search(&user, &[1.0, 0.0, 0.0], 3).await.unwrap();
        assert_eq!(results[0].0, id);
    }

    #[tokio::test]
    async fn force_flush_bumps_version_and_drains_pending() {
        let (_dir, coordinator) = test_coordinator();
        let user = UserId::new("u-alice");
        coordinator.prepare(&user).await.unwrap();
        let id = coordinator.allocate_vector_id(&user).await.unwrap();
        coordinator.add_vector(&user, id, vec![1.0, 0.0]).await.unwrap();

        let (_, version) = coordinator.force_flush(&user).await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(coordinator.batch_stats().await.users[&user].pending, 0);
    }

    #[tokio::test]
    async fn register_rejects_ownership_mismatch() {
        let (_dir, coordinator) = test_coordinator();
        let user = UserId::new("u-alice");
        coordinator.prepare(&user).await.unwrap();
        let err = coordinator.register(&user, "0xnope").await.unwrap_err();
        assert!(err.is_unauthorised() || err.is_not_found());
    }

    #[tokio::test]
    async fn register_binds_owned_on_chain_id() {
        let (dir, _unused) = test_coordinator();
        drop(_unused);

        let remote = HttpRemoteBackend::new("http://127.0.0.1:1", Duration::from_millis(1), 12);
        let routing = RoutingBlobStore::new(
            Box::new(remote),
            LocalBackend::new(dir.path().join("blobs2")),
            Duration::from_secs(300),
        );
        let bookkeeping = BookkeepingStore::open(dir.path().join("book2.redb")).unwrap();
        let user = UserId::new("u-alice");
        let mut owners = StdHashMap::new();
        owners.insert("0xabc".to_string(), user.clone());
        let onchain = FakeOnChain {
            owners: StdMutex::new(owners),
        };
        let coordinator = IndexCoordinator::new(
            Config::default(),
            Arc::new(routing),
            Arc::new(bookkeeping),
            Arc::new(onchain),
            None,
        );

        coordinator.prepare(&user).await.unwrap();
        coordinator.register(&user, "0xabc").await.unwrap();

        let stats = coordinator.batch_stats().await;
        assert_eq!(stats.users[&user].version, 1);
    }
}
