//! Per-user cosine HNSW index with batched absorb and search-over-pending (C5).
//!
//! Embeddings stored in the graph blob's sibling index blob are the
//! source of truth for a user's committed vectors; [`PerUserIndex`] keeps
//! a rebuildable in-memory handle over them plus a pending buffer that
//! hasn't been folded in yet.

mod engine;
mod snapshot;

pub use engine::PerUserIndex;
pub use snapshot::IndexSnapshot;
