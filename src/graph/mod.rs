//! Per-user entity-relationship graph (C4).
//!
//! The graph is stored by value as two ordered collections — entities and
//! relationships reference each other by string id, never by pointer — so
//! it round-trips through JSON without any arena bookkeeping (§9 "cyclic
//! graph without pointers").

mod store;

pub use store::GraphStore;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::capability::{ExtractedEntity, ExtractedRelationship};
use crate::types::{BlobId, VectorId};

/// `{ id (sanitised stable slug), label, type }` (§3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Sanitised stable slug, unique within a user's graph.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Free-form entity type/category.
    pub entity_type: String,
}

/// `{ source_id, target_id, label }` (§3). Deduplicated by the ordered
/// triple `(source, target, label)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity id (already sanitised).
    pub source_id: String,
    /// Target entity id (already sanitised).
    pub target_id: String,
    /// Edge label.
    pub label: String,
}

/// Persisted record of where a memory's content lives, keyed by the
/// vector id that introduced it (the Open Question resolution, §9).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorBlobEntry {
    /// Blob id of the stored ciphertext.
    pub blob_id: BlobId,
    /// Caller-supplied category.
    pub category: String,
}

/// A user's entity-relationship graph plus the bookkeeping that must
/// survive a cold hydration: the entity index and the vector→blob map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerUserGraph {
    /// Entities keyed by their sanitised id (the set, keyed for dedup).
    pub entities: HashMap<String, Entity>,
    /// Relationships, deduplicated by the ordered triple.
    pub relationships: BTreeSet<Relationship>,
    /// Map from entity id to the vector id of the memory that introduced
    /// it (last-writer-wins).
    pub entity_index: HashMap<String, VectorId>,
    /// Per-user `vector_id → blob_id` map, persisted inside the graph blob.
    pub vector_to_blob: HashMap<VectorId, VectorBlobEntry>,
    /// Next vector id to assign for this user.
    pub next_vector_id: VectorId,
}

/// On-disk form of [`PerUserGraph`] (the "graph blob", §6).
#[derive(Serialize, Deserialize)]
struct GraphDocument {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    entity_index: HashMap<String, u32>,
    vector_to_blob: HashMap<u32, VectorBlobEntry>,
    next_vector_id: u32,
}

impl From<&PerUserGraph> for GraphDocument {
    fn from(g: &PerUserGraph) -> Self {
        Self {
            entities: g.entities.values().cloned().collect(),
            relationships: g.relationships.iter().cloned().collect(),
            entity_index: g
                .entity_index
                .iter()
                .map(|(k, v)| (k.clone(), v.0))
                .collect(),
            vector_to_blob: g
                .vector_to_blob
                .iter()
                .map(|(k, v)| (k.0, v.clone()))
                .collect(),
            next_vector_id: g.next_vector_id.0,
        }
    }
}

impl From<GraphDocument> for PerUserGraph {
    fn from(doc: GraphDocument) -> Self {
        Self {
            entities: doc.entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
            relationships: doc.relationships.into_iter().collect(),
            entity_index: doc
                .entity_index
                .into_iter()
                .map(|(k, v)| (k, VectorId(v)))
                .collect(),
            vector_to_blob: doc
                .vector_to_blob
                .into_iter()
                .map(|(k, v)| (VectorId(k), v))
                .collect(),
            next_vector_id: VectorId(doc.next_vector_id),
        }
    }
}

impl PerUserGraph {
    /// Creates an empty graph with the vector id counter starting at 1.
    pub fn empty() -> Self {
        Self {
            next_vector_id: VectorId::FIRST,
            ..Default::default()
        }
    }

    /// Serialises this graph to the JSON wire format (§6).
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&GraphDocument::from(self))
    }

    /// Parses the JSON wire format back into a graph.
    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        let doc: GraphDocument = serde_json::from_slice(bytes)?;
        Ok(doc.into())
    }

    /// Returns a new graph with `entities` and `relationships` merged in,
    /// per the dedup and sanitisation rules of §4.2.
    ///
    /// Pure: `self` is untouched. `g.merge(e, r).merge(e, r)` equals
    /// `g.merge(e, r)` (P4).
    pub fn merge(&self, entities: &[ExtractedEntity], relationships: &[ExtractedRelationship]) -> Self {
        let mut next = self.clone();

        let mut rename: HashMap<String, String> = HashMap::new();
        for entity in entities {
            let sanitised_id = sanitise_entity_id(&entity.id);
            rename.insert(entity.id.clone(), sanitised_id.clone());
            next.entities.entry(sanitised_id.clone()).or_insert_with(|| Entity {
                id: sanitised_id,
                label: entity.label.clone(),
                entity_type: entity.entity_type.clone(),
            });
        }

        for rel in relationships {
            let source = rename
                .get(&rel.source)
                .cloned()
                .unwrap_or_else(|| sanitise_entity_id(&rel.source));
            let target = rename
                .get(&rel.target)
                .cloned()
                .unwrap_or_else(|| sanitise_entity_id(&rel.target));

            // Unknown endpoints are dropped silently (§4.2).
            if !next.entities.contains_key(&source) || !next.entities.contains_key(&target) {
                continue;
            }

            next.relationships.insert(Relationship {
                source_id: source,
                target_id: target,
                label: rel.label.clone(),
            });
        }

        next
    }

    /// Records that `entities` were introduced by `vector_id`
    /// (last-writer-wins, §3).
    pub fn index_entities(&mut self, entity_ids: impl IntoIterator<Item = String>, vector_id: VectorId) {
        for id in entity_ids {
            self.entity_index.insert(id, vector_id);
        }
    }

    /// Records the `(blob_id, category)` for `vector_id` (§9).
    pub fn record_blob(&mut self, vector_id: VectorId, blob_id: BlobId, category: String) {
        self.vector_to_blob
            .insert(vector_id, VectorBlobEntry { blob_id, category });
    }

    /// Allocates and returns the next vector id, advancing the counter.
    pub fn allocate_vector_id(&mut self) -> VectorId {
        let id = self.next_vector_id;
        self.next_vector_id = id.next();
        id
    }

    /// Breadth-first expansion from `seed_vector_ids` through the entity
    /// graph, up to `max_hops` layers (§4.2). Returns the seed set unioned
    /// with every vector id reached through the expansion.
    pub fn expand(&self, seed_vector_ids: &[VectorId], max_hops: usize) -> HashSet<VectorId> {
        let mut result: HashSet<VectorId> = seed_vector_ids.iter().copied().collect();
        if max_hops == 0 {
            return result;
        }

        let seed_set: HashSet<VectorId> = result.clone();
        let mut frontier: HashSet<&str> = self
            .entity_index
            .iter()
            .filter(|(_, v)| seed_set.contains(v))
            .map(|(k, _)| k.as_str())
            .collect();

        let mut visited: HashSet<&str> = frontier.clone();
        let adjacency = self.undirected_adjacency();

        for _ in 0..max_hops {
            let mut next_frontier: HashSet<&str> = HashSet::new();
            for entity_id in &frontier {
                if let Some(neighbours) = adjacency.get(entity_id) {
                    for &neighbour in neighbours {
                        if visited.insert(neighbour) {
                            next_frontier.insert(neighbour);
                        }
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        for entity_id in visited {
            if let Some(&vector_id) = self.entity_index.get(entity_id) {
                result.insert(vector_id);
            }
        }

        result
    }

    fn undirected_adjacency(&self) -> HashMap<&str, Vec<&str>> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for rel in &self.relationships {
            adjacency
                .entry(rel.source_id.as_str())
                .or_default()
                .push(rel.target_id.as_str());
            adjacency
                .entry(rel.target_id.as_str())
                .or_default()
                .push(rel.source_id.as_str());
        }
        adjacency
    }
}

/// Lower-cases `id` and replaces any character outside `[A-Za-z0-9_-]`
/// with `_` (§4.2).
pub fn sanitise_entity_id(id: &str) -> String {
    id.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
