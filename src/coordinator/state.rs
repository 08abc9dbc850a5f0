//! Per-user cached state (§3's `UserIndexState`) and its lifecycle status.

use std::time::Instant;

use tokio::sync::Mutex;

use crate::graph::PerUserGraph;
use crate::types::BlobId;
use crate::vector::PerUserIndex;

/// `Absent → Preparing → OnChainPending → Active(v)` (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserStatus {
    /// No cached state and no known on-chain pointer.
    Absent,
    /// Empty index and graph blobs exist; awaiting on-chain registration.
    Preparing,
    /// Caller has created the on-chain record; awaiting `register`.
    OnChainPending,
    /// Bound to an on-chain id; `version` tracks the published generation.
    Active,
}

/// Cached state for one user, guarded by the per-user lock on [`UserCell`].
pub struct UserIndexState {
    pub status: UserStatus,
    pub index_blob_id: Option<BlobId>,
    pub graph_blob_id: Option<BlobId>,
    pub on_chain_id: Option<String>,
    pub version: u64,
    pub vector_index: Option<PerUserIndex>,
    pub graph: Option<PerUserGraph>,
    pub dirty: bool,
    pub last_modified_at: Instant,
    /// Set when the first pending write lands with no flush yet scheduled;
    /// cleared once a flush drains the buffer (§3's `flush_job`).
    pub flush_scheduled_at: Option<Instant>,
}

impl UserIndexState {
    pub fn absent() -> Self {
        Self {
            status: UserStatus::Absent,
            index_blob_id: None,
            graph_blob_id: None,
            on_chain_id: None,
            version: 0,
            vector_index: None,
            graph: None,
            dirty: false,
            last_modified_at: Instant::now(),
            flush_scheduled_at: None,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.vector_index.as_ref().map_or(0, |v| v.pending_len())
    }
}

/// Per-user lock cell (I1: at most one writer per user's HNSW handle).
pub struct UserCell {
    pub state: Mutex<UserIndexState>,
}

impl UserCell {
    pub fn absent() -> Self {
        Self {
            state: Mutex::new(UserIndexState::absent()),
        }
    }
}
