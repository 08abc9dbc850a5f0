//! Content-addressed blob store abstraction (C1).
//!
//! [`RoutingBlobStore`] holds a primary remote backend and a local
//! fallback, selected per call based on a cached liveness probe (§4.1).
//! The [`BlobId`](crate::types::BlobId) returned by `put` encodes which
//! backend stores the bytes, so a subsequent `get` routes without
//! consulting the liveness cache at all.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::{HttpRemoteBackend, RemoteBackend};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::{BlobError, MemError, Result};
use crate::types::BlobId;

/// Flat string tag map attached to a blob. Always carries at least `owner`
/// and `content-type`.
pub type BlobTags = HashMap<String, String>;

/// Content-addressed put/get/exists with primary+fallback routing (C1).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns the id it was stored under.
    async fn put(&self, bytes: &[u8], tags: BlobTags) -> Result<BlobId>;

    /// Retrieves the bytes stored under `id`.
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>>;

    /// Returns true if `id` is present on its targeted backend.
    async fn exists(&self, id: &BlobId) -> Result<bool>;
}

/// `{remote_available, checked_at}` per §4.1. Read-mostly, shared across
/// every call into the store.
struct LivenessCache {
    available: AtomicBool,
    checked_at: RwLock<Instant>,
    recheck_interval: Duration,
}

impl LivenessCache {
    fn new(recheck_interval: Duration) -> Self {
        Self {
            available: AtomicBool::new(true),
            checked_at: RwLock::new(Instant::now() - recheck_interval - Duration::from_secs(1)),
            recheck_interval,
        }
    }

    fn is_stale(&self) -> bool {
        let checked_at = *self.checked_at.read().expect("liveness cache poisoned");
        checked_at.elapsed() >= self.recheck_interval
    }

    fn record(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        *self.checked_at.write().expect("liveness cache poisoned") = Instant::now();
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Blob store with a remote primary and a local fallback (§4.1).
pub struct RoutingBlobStore {
    remote: Box<dyn RemoteBackend>,
    local: LocalBackend,
    liveness: LivenessCache,
}

impl RoutingBlobStore {
    /// Creates a routing blob store over the given remote backend and
    /// local fallback directory.
    pub fn new(remote: Box<dyn RemoteBackend>, local: LocalBackend, recheck_interval: Duration) -> Self {
        Self {
            remote,
            local,
            liveness: LivenessCache::new(recheck_interval),
        }
    }

    /// Runs the liveness probe and updates the cache. Called inline when
    /// the cached probe is stale, and may also be called by a background
    /// task to keep the cache warm.
    #[instrument(skip(self))]
    pub async fn reprobe(&self) -> bool {
        let available = self.remote.probe().await;
        if available != self.liveness.available() {
            debug!(available, "remote blob backend liveness changed");
        }
        self.liveness.record(available);
        available
    }

    async fn remote_is_available(&self) -> bool {
        if self.liveness.is_stale() {
            self.reprobe().await
        } else {
            self.liveness.available()
        }
    }
}

#[async_trait]
impl BlobStore for RoutingBlobStore {
    #[instrument(skip(self, bytes, tags))]
    async fn put(&self, bytes: &[u8], tags: BlobTags) -> Result<BlobId> {
        if self.remote_is_available().await {
            match self.remote.put(bytes, &tags).await {
                Ok(id) => return Ok(id),
                Err(remote_err) => {
                    warn!(error = %remote_err, "remote put failed, falling back to local");
                    self.liveness.record(false);
                    return self.local.put(bytes, &tags).await.map_err(|local_err| {
                        MemError::Blob(BlobError::BothBackendsFailed {
                            remote: remote_err.to_string(),
                            local: local_err.to_string(),
                        })
                    });
                }
            }
        }
        self.local.put(bytes, &tags).await.map_err(MemError::from)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        if id.is_local() {
            return self.local.get(id).await.map_err(MemError::from);
        }
        // Remote ids never fall back to local on read: the ids disjoin.
        self.remote.get(id).await.map_err(MemError::from)
    }

    async fn exists(&self, id: &BlobId) -> Result<bool> {
        if id.is_local() {
            self.local.exists(id).await.map_err(MemError::from)
        } else {
            self.remote.exists(id).await.map_err(MemError::from)
        }
    }
}
