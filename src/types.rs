//! Core type definitions for identifiers, timestamps, and vectors.
//!
//! Most ids in this crate are plain strings or small integers rather than
//! UUIDs: a [`VectorId`] is a per-user monotone counter (§3), a [`BlobId`]
//! is a tagged string minted by the blob store, and an entity id is a
//! sanitised slug owned by the caller. [`MemoryId`] is the one UUID-backed
//! type, used only for the temporary token minted when a caller does not
//! supply its own (time-ordering is a nice-to-have there, not load-bearing).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier.
///
/// The crate doesn't handle authentication — the consumer provides user ids.
/// This allows integration with any auth system (wallet address, API key, etc.).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a new UserId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the user id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-user vector identifier.
///
/// Monotonically increasing, starting at 1; never reused even after a
/// logical deletion (tombstoning). Zero is reserved as a sentinel and is
/// never assigned by [`crate::coordinator::IndexCoordinator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VectorId(pub u32);

impl VectorId {
    /// The first id ever assigned to a user.
    pub const FIRST: VectorId = VectorId(1);

    /// Returns the next id in sequence.
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-addressed blob identifier.
///
/// Tagged with the backend that stores it (`local_*` / `remote_*`); the
/// tag is opaque to callers but determines routing on read (§4.1).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl BlobId {
    /// Backend-local blob id prefix.
    pub const LOCAL_PREFIX: &'static str = "local_";
    /// Remote object store blob id prefix.
    pub const REMOTE_PREFIX: &'static str = "remote_";

    /// Wraps a raw id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns true if this id is routed to the local backend.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }

    /// Returns true if this id is routed to the remote backend.
    pub fn is_remote(&self) -> bool {
        self.0.starts_with(Self::REMOTE_PREFIX)
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque memory identifier.
///
/// Either supplied by the caller (the frontend already minted an on-chain
/// record) or, if omitted, a temporary UUID v7 token assigned at ingest
/// time (§4.5 step 9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Mints a new temporary token.
    #[inline]
    pub fn new_temporary() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an externally-minted identifier given as raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embedding vector type alias.
pub type Vector = Vec<f32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_id_sequence() {
        let first = VectorId::FIRST;
        assert_eq!(first.0, 1);
        assert_eq!(first.next(), VectorId(2));
    }

    #[test]
    fn blob_id_routing_prefix() {
        let local = BlobId::new("local_123_ab9");
        assert!(local.is_local());
        assert!(!local.is_remote());

        let remote = BlobId::new("remote_abcdef");
        assert!(remote.is_remote());
        assert!(!remote.is_local());
    }

    #[test]
    fn memory_id_temporary_tokens_are_unique() {
        let a = MemoryId::new_temporary();
        let b = MemoryId::new_temporary();
        assert_ne!(a, b);
    }

    #[test]
    fn timestamp_now_is_monotone_enough() {
        let t1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let t2 = Timestamp::now();
        assert!(t1 <= t2);
    }

    #[test]
    fn user_id_roundtrip() {
        let id = UserId::new("u-alice");
        assert_eq!(id.as_str(), "u-alice");
        assert_eq!(format!("{}", id), "u-alice");
    }
}
