//! End-to-end scenarios over the `Mnemo` facade.
//!
//! Exercises the full stack (coordinator, blob store, graph, HNSW engine)
//! the way a real caller would: open, ingest, query, flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mnemo::blob::{BlobTags, RemoteBackend};
use mnemo::capability::{
    EmbeddingClient, EncryptionClient, Extraction, ExtractedEntity, ExtractedRelationship, ExtractionClient,
    NoopEncryption, OnChainLookup, OnChainPointer,
};
use mnemo::{BlobId, Config, MemError, Mnemo, Result, UserId};

/// Deterministic unit-ish embedding from a word count and a content hash,
/// close enough that shared words produce nearby vectors.
fn deterministic_embedding(text: &str) -> Vec<f32> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut bucket = [0.0f32; 16];
    for word in &words {
        let mut hash: u32 = 2166136261;
        for b in word.to_lowercase().as_bytes() {
            hash ^= *b as u32;
            hash = hash.wrapping_mul(16777619);
        }
        bucket[(hash as usize) % 16] += 1.0;
    }
    let norm: f32 = bucket.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        bucket.iter().map(|x| x / norm).collect()
    } else {
        bucket.to_vec()
    }
}

struct WordOverlapEmbedding;

#[async_trait]
impl EmbeddingClient for WordOverlapEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(deterministic_embedding(text))
    }
}

struct NoEntities;

#[async_trait]
impl ExtractionClient for NoEntities {
    async fn extract(&self, _text: &str) -> Result<Extraction> {
        Ok(Extraction::default())
    }
}

/// Extraction double for scenario 5: recognises three fixed entities by
/// substring match and wires the two edges the scenario calls for.
struct AliceAcmeParisExtraction;

#[async_trait]
impl ExtractionClient for AliceAcmeParisExtraction {
    async fn extract(&self, text: &str) -> Result<Extraction> {
        let lower = text.to_lowercase();
        let mut entities = Vec::new();
        let mut relationships = Vec::new();
        let has_alice = lower.contains("alice");
        let has_acme = lower.contains("acme");
        let has_paris = lower.contains("paris");
        if has_alice {
            entities.push(ExtractedEntity {
                id: "alice".into(),
                label: "Alice".into(),
                entity_type: "person".into(),
            });
        }
        if has_acme {
            entities.push(ExtractedEntity {
                id: "acme".into(),
                label: "Acme".into(),
                entity_type: "org".into(),
            });
        }
        if has_paris {
            entities.push(ExtractedEntity {
                id: "paris".into(),
                label: "Paris".into(),
                entity_type: "place".into(),
            });
        }
        if has_alice && has_acme {
            relationships.push(ExtractedRelationship {
                source: "alice".into(),
                target: "acme".into(),
                label: "works_at".into(),
            });
        }
        if has_acme && has_paris {
            relationships.push(ExtractedRelationship {
                source: "acme".into(),
                target: "paris".into(),
                label: "located_in".into(),
            });
        }
        Ok(Extraction { entities, relationships })
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

/// Remote backend whose availability can be flipped mid-test (scenario 6).
struct SwitchableRemote {
    up: AtomicBool,
}

impl SwitchableRemote {
    fn new(up: bool) -> Self {
        Self { up: AtomicBool::new(up) }
    }

    fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteBackend for SwitchableRemote {
    async fn put(&self, _bytes: &[u8], _tags: &BlobTags) -> Result<BlobId> {
        if self.up.load(Ordering::SeqCst) {
            Ok(BlobId::new(format!("remote_{}", uuid::Uuid::now_v7())))
        } else {
            Err(MemError::network("remote backend unavailable"))
        }
    }
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        Err(MemError::Blob(mnemo::BlobError::NotFound(id.to_string())))
    }
    async fn exists(&self, _id: &BlobId) -> Result<bool> {
        Ok(false)
    }
    async fn probe(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

fn fast_config(dir: &TempDir) -> Config {
    Config {
        local_blob_dir: dir.path().join("blobs"),
        bookkeeping_path: dir.path().join("book.redb"),
        scheduler_tick: Duration::from_secs(3600),
        eviction_tick: Duration::from_secs(3600),
        liveness_check_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

async fn open_with_extraction(
    dir: &TempDir,
    extraction: Arc<dyn ExtractionClient>,
    remote: Box<dyn RemoteBackend>,
) -> Mnemo {
    Mnemo::open(
        fast_config(dir),
        Arc::new(WordOverlapEmbedding),
        extraction,
        Arc::new(NoopEncryption),
        Arc::new(RejectingOnChain),
        remote,
        None,
    )
    .await
    .unwrap()
}

// ============================================================================
// Scenario 1: first-ingest bootstrap
// ============================================================================

#[tokio::test]
async fn first_ingest_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = open_with_extraction(&dir, Arc::new(NoEntities), Box::new(SwitchableRemote::new(false))).await;
    let user = UserId::new("u-alice");

    let ingested = mnemo.ingest("I love pizza", "preference", &user, None).await.unwrap();
    assert_eq!(ingested.vector_id, mnemo::VectorId::FIRST);

    let stats = mnemo.batch_stats().await;
    assert_eq!(stats.users[&user].pending, 1);
}

// ============================================================================
// Scenario 2: read-your-writes without flush
// ============================================================================

#[tokio::test]
async fn read_your_writes_without_flush() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = open_with_extraction(&dir, Arc::new(NoEntities), Box::new(SwitchableRemote::new(false))).await;
    let user = UserId::new("u-alice");

    mnemo.ingest("I love pizza", "preference", &user, None).await.unwrap();

    let results = mnemo.query("pizza", &user, 3).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, b"I love pizza");
}

// ============================================================================
// Scenario 3: threshold flush
// ============================================================================

#[tokio::test]
async fn threshold_flush_on_fiftieth_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = open_with_extraction(&dir, Arc::new(NoEntities), Box::new(SwitchableRemote::new(false))).await;
    let user = UserId::new("u2-bob");

    let mut last_blob_id = None;
    for i in 0..50 {
        let ingested = mnemo
            .ingest(&format!("distinct memory number {i}"), "note", &user, None)
            .await
            .unwrap();
        last_blob_id = Some(ingested.blob_id);
    }

    let stats = mnemo.batch_stats().await;
    assert_eq!(stats.users[&user].pending, 0);
    assert_eq!(stats.users[&user].version, 1);

    let results = mnemo.query("distinct memory number 49", &user, 1).await.unwrap();
    assert_eq!(results[0].blob_id, last_blob_id.unwrap());
}

// ============================================================================
// Scenario 4: dimension guard
// ============================================================================

/// Embeds at a fixed dimension, except for content containing the marker
/// `"__WRONG_DIM__"`, which comes back one dimension too wide — standing in
/// for "inject a D+1 vector through the embedding client".
struct MostlyFixedDimEmbedding {
    dim: usize,
}

#[async_trait]
impl EmbeddingClient for MostlyFixedDimEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("__WRONG_DIM__") {
            Ok(vec![0.0; self.dim + 1])
        } else {
            Ok(deterministic_embedding(text)[..self.dim.min(16)].to_vec())
        }
    }
}

#[tokio::test]
async fn dimension_guard_rejects_mismatched_vector_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = Mnemo::open(
        fast_config(&dir),
        Arc::new(MostlyFixedDimEmbedding { dim: 16 }),
        Arc::new(NoEntities),
        Arc::new(NoopEncryption),
        Arc::new(RejectingOnChain),
        Box::new(SwitchableRemote::new(false)),
        None,
    )
    .await
    .unwrap();
    let user = UserId::new("u2-bob");

    mnemo.ingest("seed memory", "note", &user, None).await.unwrap();
    let stats_before = mnemo.batch_stats().await;
    let pending_before = stats_before.users[&user].pending;

    let err = mnemo.ingest("__WRONG_DIM__", "note", &user, None).await.unwrap_err();
    assert!(err.is_dimension_mismatch());

    let stats_after = mnemo.batch_stats().await;
    assert_eq!(stats_after.users[&user].pending, pending_before);

    mnemo.ingest("ordinary next memory", "note", &user, None).await.unwrap();
}

// ============================================================================
// Scenario 5: graph expansion
// ============================================================================

#[tokio::test]
async fn graph_expansion_surfaces_one_hop_neighbour() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = open_with_extraction(&dir, Arc::new(AliceAcmeParisExtraction), Box::new(SwitchableRemote::new(false))).await;
    let user = UserId::new("u3-carol");

    mnemo.ingest("Alice works at Acme", "note", &user, None).await.unwrap();
    mnemo.ingest("Acme is in Paris", "note", &user, None).await.unwrap();

    let results = mnemo.query("Where does Alice work?", &user, 1).await.unwrap();
    let contents: Vec<Vec<u8>> = results.into_iter().map(|r| r.content).collect();
    assert!(contents.contains(&b"Alice works at Acme".to_vec()) || contents.contains(&b"Acme is in Paris".to_vec()));

    // With k large enough to surface both, the 1-hop expansion through
    // "acme" must bring in the second memory alongside the direct hit.
    let results = mnemo.query("Where does Alice work?", &user, 5).await.unwrap();
    let contents: Vec<Vec<u8>> = results.into_iter().map(|r| r.content).collect();
    assert!(contents.contains(&b"Alice works at Acme".to_vec()));
    assert!(contents.contains(&b"Acme is in Paris".to_vec()));
}

// ============================================================================
// Scenario 6: blob store failover
// ============================================================================

#[tokio::test]
async fn blob_store_failover_to_local_then_back_to_remote() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(SwitchableRemote::new(false));
    let remote_backend: Box<dyn RemoteBackend> = Box::new(ProxyRemote(Arc::clone(&remote)));
    let mnemo = open_with_extraction(&dir, Arc::new(NoEntities), remote_backend).await;
    let user = UserId::new("u-dana");

    let ingested = mnemo.ingest("stored while remote is down", "note", &user, None).await.unwrap();
    assert!(ingested.blob_id.is_local());

    let results = mnemo.query("stored while remote is down", &user, 1).await.unwrap();
    assert_eq!(results[0].blob_id, ingested.blob_id);

    remote.set(true);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let ingested_after = mnemo.ingest("stored once remote recovered", "note", &user, None).await.unwrap();
    assert!(ingested_after.blob_id.is_remote());

    let results = mnemo.query("stored while remote is down", &user, 1).await.unwrap();
    assert_eq!(results[0].blob_id, ingested.blob_id);
}

/// Shares one `SwitchableRemote`'s liveness flag across a test without
/// making `Mnemo::open` take an `Arc<dyn RemoteBackend>`.
struct ProxyRemote(Arc<SwitchableRemote>);

#[async_trait]
impl RemoteBackend for ProxyRemote {
    async fn put(&self, bytes: &[u8], tags: &BlobTags) -> Result<BlobId> {
        self.0.put(bytes, tags).await
    }
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        self.0.get(id).await
    }
    async fn exists(&self, id: &BlobId) -> Result<bool> {
        self.0.exists(id).await
    }
    async fn probe(&self) -> bool {
        self.0.probe().await
    }
}
