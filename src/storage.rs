//! Bookkeeping storage: schema metadata and the on-chain pointer cache.
//!
//! This is deliberately narrow. Per-user domain state — vectors, graph,
//! the `vector_id → blob_id` map — lives in the blob store (§9's Open
//! Question resolution); redb holds only what the coordinator needs
//! before it has fetched those blobs: the last-known on-chain pointer for
//! a user, and the schema version of this database file.

use std::path::{Path, PathBuf};

use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capability::OnChainPointer;
use crate::error::{MemError, Result, StorageError};
use crate::types::UserId;

/// Current schema version. Bump when the table layout changes.
pub const SCHEMA_VERSION: u32 = 1;

const METADATA_KEY: &str = "db_metadata";

const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");
const POINTERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("on_chain_pointers");

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DatabaseMetadata {
    schema_version: u32,
    created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredPointer {
    on_chain_id: String,
    version: u64,
    index_blob_id: String,
    graph_blob_id: String,
}

impl From<&OnChainPointer> for StoredPointer {
    fn from(p: &OnChainPointer) -> Self {
        Self {
            on_chain_id: p.on_chain_id.clone(),
            version: p.version,
            index_blob_id: p.index_blob_id.clone(),
            graph_blob_id: p.graph_blob_id.clone(),
        }
    }
}

impl From<StoredPointer> for OnChainPointer {
    fn from(p: StoredPointer) -> Self {
        Self {
            on_chain_id: p.on_chain_id,
            version: p.version,
            index_blob_id: p.index_blob_id,
            graph_blob_id: p.graph_blob_id,
        }
    }
}

/// redb-backed bookkeeping store.
pub struct BookkeepingStore {
    db: Database,
    path: PathBuf,
}

impl BookkeepingStore {
    /// Opens or creates the bookkeeping database at `path`.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let exists = path.exists();
        let db = Database::create(path).map_err(StorageError::from)?;

        if exists {
            Self::open_existing(db, path.to_path_buf())
        } else {
            Self::initialize_new(db, path.to_path_buf())
        }
    }

    fn initialize_new(db: Database, path: PathBuf) -> Result<Self> {
        info!("initializing new bookkeeping database");
        let metadata = DatabaseMetadata {
            schema_version: SCHEMA_VERSION,
            created_at: crate::types::Timestamp::now().as_millis(),
        };

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE).map_err(StorageError::from)?;
            let bytes = bincode::serialize(&metadata)?;
            meta_table.insert(METADATA_KEY, bytes.as_slice()).map_err(StorageError::from)?;
            let _ = write_txn.open_table(POINTERS_TABLE).map_err(StorageError::from)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        Ok(Self { db, path })
    }

    fn open_existing(db: Database, path: PathBuf) -> Result<Self> {
        debug!("opening existing bookkeeping database");
        let read_txn = db.begin_read().map_err(StorageError::from)?;
        let metadata = {
            let table = read_txn
                .open_table(METADATA_TABLE)
                .map_err(|e| StorageError::corrupted(format!("cannot open metadata table: {e}")))?;
            let bytes = table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("missing database metadata"))?;
            bincode::deserialize::<DatabaseMetadata>(bytes.value())
                .map_err(|e| StorageError::corrupted(format!("invalid metadata format: {e}")))?
        };

        if metadata.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "schema version mismatch"
            );
            return Err(MemError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        Ok(Self { db, path })
    }

    /// Path to the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetches the last-known on-chain pointer for `user`, if any.
    #[instrument(skip(self))]
    pub fn get_pointer(&self, user: &UserId) -> Result<Option<OnChainPointer>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = match read_txn.open_table(POINTERS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StorageError::from(e).into()),
        };
        let Some(bytes) = table.get(user.as_str()).map_err(StorageError::from)? else {
            return Ok(None);
        };
        let stored: StoredPointer = bincode::deserialize(bytes.value())?;
        Ok(Some(stored.into()))
    }

    /// Records the current on-chain pointer for `user`, overwriting any
    /// previous value.
    #[instrument(skip(self, pointer))]
    pub fn put_pointer(&self, user: &UserId, pointer: &OnChainPointer) -> Result<()> {
        let bytes = bincode::serialize(&StoredPointer::from(pointer))?;
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = write_txn.open_table(POINTERS_TABLE).map_err(StorageError::from)?;
            table.insert(user.as_str(), bytes.as_slice()).map_err(StorageError::from)?;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }
}

// redb::Database is Send + Sync internally; BookkeepingStore adds no
// un-synchronised state on top of it.
unsafe impl Send for BookkeepingStore {}
unsafe impl Sync for BookkeepingStore {}
