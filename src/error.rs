//! Error types for the memory layer.
//!
//! The crate uses a hierarchical error system:
//! - [`MemError`] is the top-level error returned by all public APIs
//! - [`BlobError`], [`GraphError`], and [`StorageError`] provide detail for
//!   their respective subsystems
//!
//! The variants of [`MemError`] map one-to-one onto the error kinds of the
//! design: `DimensionMismatch`, `NotFound`, `Unauthorised`, `Network`,
//! `Transient`, `Corrupt`, `Conflict`.

use thiserror::Error;

/// Result type alias for memory layer operations.
pub type Result<T> = std::result::Result<T, MemError>;

/// Top-level error enum for all public operations.
///
/// Use the `is_*()` predicates or pattern matching to branch on specific
/// cases. See the propagation policy in the design notes for which
/// component surfaces which variant.
#[derive(Debug, Error)]
pub enum MemError {
    /// A vector's dimension differs from the user's already-committed
    /// dimension. Fatal for that write; the caller must reconcile.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed by the user's first insertion.
        expected: usize,
        /// Dimension of the rejected vector.
        got: usize,
    },

    /// A blob id, user, or on-chain id is absent. Recoverable — the caller
    /// may re-`prepare`.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ownership mismatch on `register` or an on-chain fetch. Fatal.
    #[error("unauthorised: {0}")]
    Unauthorised(String),

    /// Remote blob store I/O failed. Writes fall back to local; reads
    /// surface this directly.
    #[error("network error: {0}")]
    Network(String),

    /// A retryable error from the blob store or scheduler. The caller may
    /// retry with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// Blob deserialisation failed. The affected user's cache must be
    /// invalidated and a fresh `prepare` is required.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// A flush was attempted while another flush holds the user lock.
    /// The caller should wait and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage layer error (redb bookkeeping store).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blob store error not already covered by a more specific variant.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    /// Graph store error not already covered by a more specific variant.
    #[error("graph store error: {0}")]
    Graph(#[from] GraphError),

    /// Configuration error.
    #[error("configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemError {
    /// Creates a not-found error with the given context.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an unauthorised error with the given context.
    pub fn unauthorised(msg: impl Into<String>) -> Self {
        Self::Unauthorised(msg.into())
    }

    /// Creates a network error with the given context.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a transient error with the given context.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates a corrupt-data error with the given context.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Creates a conflict error with the given context.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a dimension mismatch error.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// Returns true if this is a not-found error, whether it surfaced
    /// directly or was wrapped from a missing blob (§7's `NotFound` kind
    /// covers both: a caller branching on "does this exist" shouldn't have
    /// to know which subsystem raised it).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Blob(BlobError::NotFound(_)))
    }

    /// Returns true if this is an unauthorised error.
    pub fn is_unauthorised(&self) -> bool {
        matches!(self, Self::Unauthorised(_))
    }

    /// Returns true if this is a network error.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Returns true if this is a transient, retryable error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if this is a corrupt-data error.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }

    /// Returns true if this is a lock conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Blob store errors (C1).
#[derive(Debug, Error)]
pub enum BlobError {
    /// Both the remote and local backend failed on a `put`.
    #[error("both backends failed: remote={remote}, local={local}")]
    BothBackendsFailed {
        /// Remote backend failure description.
        remote: String,
        /// Local backend failure description.
        local: String,
    },

    /// The targeted backend for a `get` failed.
    #[error("backend I/O failed: {0}")]
    Io(String),

    /// The requested blob id was not found on its targeted backend.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The liveness probe itself failed in a way that is not classified as
    /// network/timeout/unreachable (treated as "available" per §4.1, but
    /// retained here for diagnostics).
    #[error("liveness probe error: {0}")]
    Probe(String),
}

/// Graph store errors (C4).
#[derive(Debug, Error)]
pub enum GraphError {
    /// The serialised graph document failed to parse.
    #[error("graph document parse failure: {0}")]
    ParseFailure(String),

    /// The graph document failed to serialise for storage.
    #[error("graph document serialise failure: {0}")]
    SerialiseFailure(String),
}

/// Bookkeeping storage errors (redb).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database file or data is corrupted.
    #[error("database corrupted: {0}")]
    Corrupted(String),

    /// Transaction failed (commit, rollback, etc.).
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Error from the redb storage engine.
    #[error("storage engine error: {0}")]
    Redb(String),

    /// Database schema version doesn't match expected version.
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Actual schema version found in the database.
        found: u32,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a redb error with the given message.
    pub fn redb(msg: impl Into<String>) -> Self {
        Self::Redb(msg.into())
    }
}

impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("storage error: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Corrupted(err.to_string())
    }
}

impl From<redb::Error> for MemError {
    fn from(err: redb::Error) -> Self {
        MemError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for MemError {
    fn from(err: redb::DatabaseError) -> Self {
        MemError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for MemError {
    fn from(err: redb::TransactionError) -> Self {
        MemError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for MemError {
    fn from(err: redb::CommitError) -> Self {
        MemError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for MemError {
    fn from(err: redb::TableError) -> Self {
        MemError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for MemError {
    fn from(err: redb::StorageError) -> Self {
        MemError::Storage(StorageError::from(err))
    }
}

// Serialisation failures on the bincode-encoded index blob surface as
// `Corrupt` directly (§7) rather than being folded into `StorageError`,
// since they originate from C5, not the bookkeeping store.
impl From<bincode::Error> for MemError {
    fn from(err: bincode::Error) -> Self {
        MemError::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::ParseFailure(err.to_string())
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        BlobError::Io(err.to_string())
    }
}
