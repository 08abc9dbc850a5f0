//! Benchmarks for memory-layer lifecycle and hot-path operations.
//!
//! Run with: `cargo bench`
//!
//! Performance targets:
//! - `Mnemo::open()` < 100ms for a fresh data directory
//! - `force_flush()` < 50ms for a 50-vector pending batch
//! - `query()` < 20ms against a few hundred committed vectors

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::tempdir;
use tokio::runtime::Runtime;

use mnemo::blob::{BlobTags, RemoteBackend};
use mnemo::capability::{EmbeddingClient, Extraction, ExtractionClient, NoopEncryption, OnChainLookup, OnChainPointer};
use mnemo::{BlobError, BlobId, Config, MemError, Mnemo, Result, UserId};

struct FixedEmbedding;

#[async_trait]
impl EmbeddingClient for FixedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 32];
        for (i, b) in text.bytes().enumerate() {
            v[i % 32] += b as f32;
        }
        Ok(v)
    }
}

struct NoEntities;

#[async_trait]
impl ExtractionClient for NoEntities {
    async fn extract(&self, _text: &str) -> Result<Extraction> {
        Ok(Extraction::default())
    }
}

struct RejectingOnChain;

#[async_trait]
impl OnChainLookup for RejectingOnChain {
    async fn owner_of(&self, on_chain_id: &str) -> Result<UserId> {
        Err(MemError::not_found(on_chain_id))
    }
    async fn memory_index_for(&self, _user: &UserId) -> Result<Option<OnChainPointer>> {
        Ok(None)
    }
}

struct AlwaysDownRemote;

#[async_trait]
impl RemoteBackend for AlwaysDownRemote {
    async fn put(&self, _bytes: &[u8], _tags: &BlobTags) -> Result<BlobId> {
        Err(MemError::network("remote down"))
    }
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        Err(MemError::Blob(BlobError::NotFound(id.to_string())))
    }
    async fn exists(&self, _id: &BlobId) -> Result<bool> {
        Ok(false)
    }
    async fn probe(&self) -> bool {
        false
    }
}

async fn open_mnemo(dir: &tempfile::TempDir) -> Mnemo {
    let config = Config {
        local_blob_dir: dir.path().join("blobs"),
        bookkeeping_path: dir.path().join("book.redb"),
        scheduler_tick: Duration::from_secs(3600),
        eviction_tick: Duration::from_secs(3600),
        ..Default::default()
    };
    Mnemo::open(
        config,
        Arc::new(FixedEmbedding),
        Arc::new(NoEntities),
        Arc::new(NoopEncryption),
        Arc::new(RejectingOnChain),
        Box::new(AlwaysDownRemote),
        None,
    )
    .await
    .unwrap()
}

/// Benchmark opening a fresh memory layer over an empty data directory.
fn bench_open_new(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("open_new_mnemo", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let start = std::time::Instant::now();
                let mnemo = open_mnemo(&dir).await;
                total += start.elapsed();
                mnemo.close().await.unwrap();
            }
            total
        });
    });
}

/// Benchmark flushing a user with 50 pending vectors (the batch threshold).
fn bench_force_flush(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("force_flush_fifty_pending", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let mnemo = open_mnemo(&dir).await;
                let user = UserId::new("u-bench");
                for i in 0..50 {
                    mnemo.ingest(&format!("bench memory {i}"), "note", &user, None).await.unwrap();
                }

                let start = std::time::Instant::now();
                mnemo.force_flush(&user).await.unwrap();
                total += start.elapsed();

                mnemo.close().await.unwrap();
            }
            total
        });
    });
}

/// Benchmark querying a user with a few hundred committed vectors.
fn bench_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempdir().unwrap();
    let mnemo = rt.block_on(async {
        let mnemo = open_mnemo(&dir).await;
        let user = UserId::new("u-bench");
        for i in 0..300 {
            mnemo.ingest(&format!("bench memory {i}"), "note", &user, None).await.unwrap();
        }
        mnemo.force_flush(&user).await.unwrap();
        mnemo
    });
    let user = UserId::new("u-bench");

    c.bench_function("query_against_300_committed_vectors", |b| {
        b.to_async(&rt).iter(|| {
            let mnemo = &mnemo;
            let user = &user;
            async move {
                mnemo.query("bench memory 150", user, 5).await.unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_open_new, bench_force_flush, bench_query);
criterion_main!(benches);
