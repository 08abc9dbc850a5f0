//! Serialised form of a committed HNSW handle (the "index blob", §6).
//!
//! `hnsw_rs`'s own graph serialisation has lifetime constraints that make
//! round-tripping awkward (the same limitation the teacher worked around).
//! Instead the snapshot stores the raw vectors and rebuilds the graph with
//! a parallel bulk insert on load — opaque to callers, but it round-trips
//! through the engine's own serialiser as required.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::VectorId;

#[derive(Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// `None` for an index that has never absorbed a vector — dimension
    /// isn't pinned until the first write, and an empty snapshot must not
    /// claim one (a cold hydration from it would wrongly pin dimension 0).
    pub dimension: Option<usize>,
    pub vectors: Vec<(u32, Vec<f32>)>,
    pub deleted: Vec<u32>,
}

impl IndexSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn vector_ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.vectors.iter().map(|(id, _)| VectorId(*id))
    }
}
