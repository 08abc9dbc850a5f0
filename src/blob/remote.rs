//! Remote object store backend and its liveness probe.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::blob::BlobTags;
use crate::error::{BlobError, Result};
use crate::types::BlobId;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const LIVENESS_SENTINEL_ID: &str = "__mnemo_liveness_probe__";

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect()
}

/// Primary (remote) blob backend, consulted before the local fallback.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Stores `bytes` remotely and returns a `remote_*` id.
    async fn put(&self, bytes: &[u8], tags: &BlobTags) -> Result<BlobId>;

    /// Retrieves the bytes stored under `id`.
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>>;

    /// Returns true if `id` exists on the remote backend.
    async fn exists(&self, id: &BlobId) -> Result<bool>;

    /// Cheap liveness check (§4.1): a `get` of a sentinel id with a short
    /// timeout. Network/timeout/unreachable failures mean unavailable;
    /// any other outcome — including a clean "not found" — means available.
    async fn probe(&self) -> bool;
}

/// HTTP-backed remote object store client.
pub struct HttpRemoteBackend {
    base_url: String,
    client: reqwest::Client,
    probe_timeout: Duration,
    storage_epochs: u32,
}

impl HttpRemoteBackend {
    /// Creates a client against `base_url`, e.g. `https://blobs.example.com`.
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration, storage_epochs: u32) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            probe_timeout,
            storage_epochs,
        }
    }

    fn object_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), id)
    }
}

#[async_trait]
impl RemoteBackend for HttpRemoteBackend {
    async fn put(&self, bytes: &[u8], tags: &BlobTags) -> Result<BlobId> {
        let id = BlobId::new(format!("{}{}", BlobId::REMOTE_PREFIX, random_base36(16)));
        let mut request = self
            .client
            .put(self.object_url(id.as_str()))
            .header("x-storage-epochs", self.storage_epochs.to_string())
            .body(bytes.to_vec());
        for (key, value) in tags {
            request = request.header(format!("x-tag-{key}"), value.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BlobError::Io(format!(
                "remote put failed with status {}",
                response.status()
            ))
            .into());
        }
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.object_url(id.as_str()))
            .send()
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(id.to_string()).into());
        }
        if !response.status().is_success() {
            return Err(BlobError::Io(format!(
                "remote get failed with status {}",
                response.status()
            ))
            .into());
        }
        Ok(response
            .bytes()
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?
            .to_vec())
    }

    async fn exists(&self, id: &BlobId) -> Result<bool> {
        let response = self
            .client
            .head(self.object_url(id.as_str()))
            .send()
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn probe(&self) -> bool {
        let result = self
            .client
            .get(self.object_url(LIVENESS_SENTINEL_ID))
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            // Any response at all — including 404 — means the backend is reachable.
            Ok(_) => true,
            Err(e) => !(e.is_timeout() || e.is_connect()),
        }
    }
}
