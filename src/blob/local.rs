//! Local blob backend: a directory with two files per blob.
//!
//! `<id>.bin` holds the raw bytes; `<id>.meta.json` holds tags, size, and
//! creation time (§6's local sidecar format). Writes are atomic at the
//! file level: write to a temp file in the same directory, then rename.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::blob::BlobTags;
use crate::error::{BlobError, MemError, Result};
use crate::types::{BlobId, Timestamp};

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect()
}

fn mint_local_id() -> BlobId {
    let unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    BlobId::new(format!(
        "{}{}_{}",
        BlobId::LOCAL_PREFIX,
        unix_ms,
        random_base36(8)
    ))
}

/// Sidecar metadata persisted alongside each local blob.
#[derive(Debug, Serialize, Deserialize)]
struct LocalBlobMeta {
    blob_id: String,
    tags: BlobTags,
    size: usize,
    created_at: i64,
}

/// Local fallback blob backend.
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    /// Creates a backend rooted at `dir`. The directory is created lazily
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn bin_path(&self, id: &BlobId) -> PathBuf {
        self.dir.join(format!("{}.bin", id.as_str()))
    }

    fn meta_path(&self, id: &BlobId) -> PathBuf {
        self.dir.join(format!("{}.meta.json", id.as_str()))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp_path = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("part")
        ));
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, path).await
    }

    /// Stores `bytes` under a freshly minted local id.
    pub async fn put(&self, bytes: &[u8], tags: &BlobTags) -> Result<BlobId> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;

        let id = mint_local_id();
        let meta = LocalBlobMeta {
            blob_id: id.0.clone(),
            tags: tags.clone(),
            size: bytes.len(),
            created_at: Timestamp::now().as_millis(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| BlobError::Io(format!("sidecar serialise failed: {e}")))?;

        self.write_atomic(&self.bin_path(&id), bytes)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        self.write_atomic(&self.meta_path(&id), &meta_json)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;

        Ok(id)
    }

    /// Reads back the bytes stored under `id`.
    pub async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        fs::read(self.bin_path(id))
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BlobError::NotFound(id.to_string())
                } else {
                    BlobError::Io(e.to_string())
                }
            })
            .map_err(MemError::from)
    }

    /// Returns true if `id` has both its data and sidecar files present.
    pub async fn exists(&self, id: &BlobId) -> Result<bool> {
        Ok(fs::metadata(self.bin_path(id)).await.is_ok())
    }
}
