//! Per-user HNSW index: committed handle, pending buffer, flush (C5).

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use hnsw_rs::prelude::*;

use crate::config::HnswConfig;
use crate::error::{MemError, Result};
use crate::types::{Vector, VectorId};
use crate::vector::snapshot::IndexSnapshot;

/// The committed, on-disk representation of a user's index: the live HNSW
/// graph, the raw vectors that built it (kept around so the handle can be
/// rebuilt/cloned without relying on `hnsw_rs`'s own graph serialisation),
/// and the tombstone set.
struct CommittedHandle {
    hnsw: Hnsw<'static, f32, DistCosine>,
    vectors: HashMap<VectorId, Vector>,
    deleted: HashSet<VectorId>,
}

impl CommittedHandle {
    fn empty(config: &HnswConfig) -> Self {
        Self {
            hnsw: Hnsw::new(
                config.max_nb_connection,
                config.max_elements,
                config.max_layer,
                config.ef_construction,
                DistCosine,
            ),
            vectors: HashMap::new(),
            deleted: HashSet::new(),
        }
    }

    /// Rebuilds a handle from a flat vector set via a parallel bulk insert,
    /// the same technique used for cold hydration and for the transient
    /// search-with-pending overlay.
    fn rebuild(config: &HnswConfig, vectors: HashMap<VectorId, Vector>, deleted: HashSet<VectorId>) -> Self {
        let hnsw = Hnsw::new(
            config.max_nb_connection,
            config.max_elements,
            config.max_layer,
            config.ef_construction,
            DistCosine,
        );
        if !vectors.is_empty() {
            let batch: Vec<(&Vec<f32>, usize)> = vectors.iter().map(|(id, v)| (v, id.0 as usize)).collect();
            hnsw.parallel_insert(&batch);
        }
        Self { hnsw, vectors, deleted }
    }

    fn add_point(&mut self, id: VectorId, vector: Vector) {
        self.hnsw.insert((&vector, id.0 as usize));
        self.vectors.insert(id, vector);
    }

    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<(VectorId, f32)> {
        if self.vectors.is_empty() {
            return Vec::new();
        }
        let deleted = &self.deleted;
        let filter_fn = |id: &usize| -> bool { !deleted.contains(&VectorId(*id as u32)) };
        let results = if self.deleted.is_empty() {
            self.hnsw.search(query, k, ef_search)
        } else {
            self.hnsw.search_filter(query, k, ef_search, Some(&filter_fn))
        };
        results
            .into_iter()
            .map(|n| (VectorId(n.d_id as u32), n.distance))
            .collect()
    }

    fn to_snapshot(&self, dimension: Option<usize>) -> IndexSnapshot {
        IndexSnapshot {
            dimension,
            vectors: self.vectors.iter().map(|(id, v)| (id.0, v.clone())).collect(),
            deleted: self.deleted.iter().map(|id| id.0).collect(),
        }
    }
}

/// Per-user HNSW state: a committed handle plus a pending write buffer
/// absorbed without I/O (§4.3).
pub struct PerUserIndex {
    config: HnswConfig,
    dimension: RwLock<Option<usize>>,
    committed: RwLock<CommittedHandle>,
    pending: Mutex<HashMap<VectorId, Vector>>,
}

impl PerUserIndex {
    /// Creates a fresh, empty index with no dimension pinned yet.
    pub fn empty(config: HnswConfig) -> Self {
        let committed = CommittedHandle::empty(&config);
        Self {
            config,
            dimension: RwLock::new(None),
            committed: RwLock::new(committed),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuilds an index from a serialised snapshot (cold hydration).
    pub fn hydrate(config: HnswConfig, snapshot: IndexSnapshot) -> Self {
        let dimension = snapshot.dimension;
        let vectors: HashMap<VectorId, Vector> = snapshot
            .vectors
            .into_iter()
            .map(|(id, v)| (VectorId(id), v))
            .collect();
        let deleted: HashSet<VectorId> = snapshot.deleted.into_iter().map(VectorId).collect();
        let committed = CommittedHandle::rebuild(&config, vectors, deleted);
        Self {
            config,
            dimension: RwLock::new(dimension),
            committed: RwLock::new(committed),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The dimension fixed by this user's first insertion, if any.
    pub fn dimension(&self) -> Option<usize> {
        *self.dimension.read().expect("dimension lock poisoned")
    }

    /// Number of vectors currently absorbed but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    /// Total count of vectors, committed and pending.
    pub fn len(&self) -> usize {
        let committed = self.committed.read().expect("committed lock poisoned").vectors.len();
        committed + self.pending_len()
    }

    /// Queues `vector` under `id`. Performs no I/O; dimension mismatches
    /// are rejected and leave the cache unchanged (P3).
    pub fn add_batched(&self, id: VectorId, vector: Vector) -> Result<()> {
        {
            let mut dimension = self.dimension.write().expect("dimension lock poisoned");
            match *dimension {
                Some(expected) if expected != vector.len() => {
                    return Err(MemError::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    });
                }
                Some(_) => {}
                None => *dimension = Some(vector.len()),
            }
        }
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id, vector);
        Ok(())
    }

    /// Searches the committed index layered with any pending writes
    /// (read-your-writes, §4.3/P1). Returns up to `k` results sorted by
    /// ascending cosine distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>> {
        if let Some(expected) = self.dimension() {
            if query.len() != expected {
                return Err(MemError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        } else {
            return Ok(Vec::new());
        }

        let pending = self.pending.lock().expect("pending lock poisoned").clone();
        let committed = self.committed.read().expect("committed lock poisoned");

        if pending.is_empty() {
            return Ok(committed.search(query, k, self.config.ef_search));
        }

        let mut merged = committed.vectors.clone();
        merged.extend(pending);
        let transient = CommittedHandle::rebuild(&self.config, merged, committed.deleted.clone());
        Ok(transient.search(query, k, self.config.ef_search))
    }

    /// Drains `pending`, applies it to the committed handle, and returns
    /// the new serialised snapshot. New writes arriving during the flush
    /// land in a fresh pending buffer untouched by this call (§4.3 step 2).
    pub fn force_flush(&self) -> Result<IndexSnapshot> {
        let drained: HashMap<VectorId, Vector> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            std::mem::take(&mut *pending)
        };

        let mut committed = self.committed.write().expect("committed lock poisoned");
        for (id, vector) in drained {
            committed.add_point(id, vector);
        }

        Ok(committed.to_snapshot(self.dimension()))
    }

    /// Tombstones `id`: removed outright if still pending, marked deleted
    /// if already committed. Errors if the id is unknown in either place.
    pub fn remove(&self, id: VectorId) -> Result<()> {
        {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            if pending.remove(&id).is_some() {
                return Ok(());
            }
        }
        let mut committed = self.committed.write().expect("committed lock poisoned");
        if committed.vectors.contains_key(&id) {
            committed.deleted.insert(id);
            Ok(())
        } else {
            Err(MemError::not_found(format!("vector {id} not found")))
        }
    }
}
