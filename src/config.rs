//! Configuration types for the memory layer.
//!
//! The [`Config`] struct controls the tunables named in the design's
//! external-interfaces section: batch timing, cache eviction, liveness
//! re-probe interval, and cold-hydration sanity checks.
//!
//! ```rust
//! use mnemo::Config;
//!
//! let config = Config::default();
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::MemError;

/// Memory layer configuration.
///
/// All fields have defaults matching the design's tunables table. Use
/// struct update syntax to override specific settings:
///
/// ```rust
/// use mnemo::Config;
///
/// let config = Config {
///     max_batch: 100,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Minimum time between the first pending write and a scheduled flush.
    /// Default: 5 s.
    pub batch_delay: Duration,

    /// Pending-queue size that triggers an immediate flush.
    /// Default: 50.
    pub max_batch: usize,

    /// Idle eviction threshold for a user's cached state.
    /// Default: 30 min.
    pub cache_ttl: Duration,

    /// Liveness re-probe interval for the remote blob backend.
    /// Default: 5 min.
    pub liveness_check_interval: Duration,

    /// Storage epoch count passed through to the remote backend on put.
    /// Default: 12.
    pub default_storage_epochs: u32,

    /// Dimension used only for cold-hydration sanity checks before the
    /// real dimension is recovered from a serialised index header.
    /// Default: 768.
    pub default_vector_dimensions: usize,

    /// How often the flush scheduler tick runs.
    /// Default: 5 s.
    pub scheduler_tick: Duration,

    /// How often the cache-eviction sweep runs.
    /// Default: 5 min.
    pub eviction_tick: Duration,

    /// Outer timeout for blob store operations.
    /// Default: 60 s.
    pub blob_timeout: Duration,

    /// Timeout for the liveness probe itself.
    /// Default: 5 s.
    pub liveness_probe_timeout: Duration,

    /// Directory backing the local blob store fallback.
    pub local_blob_dir: PathBuf,

    /// Directory backing the redb bookkeeping store.
    pub bookkeeping_path: PathBuf,

    /// HNSW tuning parameters.
    pub hnsw: HnswConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_secs(5),
            max_batch: 50,
            cache_ttl: Duration::from_secs(30 * 60),
            liveness_check_interval: Duration::from_secs(5 * 60),
            default_storage_epochs: 12,
            default_vector_dimensions: 768,
            scheduler_tick: Duration::from_secs(5),
            eviction_tick: Duration::from_secs(5 * 60),
            blob_timeout: Duration::from_secs(60),
            liveness_probe_timeout: Duration::from_secs(5),
            local_blob_dir: PathBuf::from("./mnemo-data/blobs"),
            bookkeeping_path: PathBuf::from("./mnemo-data/bookkeeping.redb"),
            hnsw: HnswConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically when a [`crate::Mnemo`] is opened. Can also be
    /// called explicitly to check configuration up front.
    pub fn validate(&self) -> Result<(), MemError> {
        if self.max_batch == 0 {
            return Err(MemError::config("max_batch must be greater than 0"));
        }
        if self.batch_delay.is_zero() {
            return Err(MemError::config("batch_delay must be greater than 0"));
        }
        if self.cache_ttl.is_zero() {
            return Err(MemError::config("cache_ttl must be greater than 0"));
        }
        if self.default_vector_dimensions == 0 {
            return Err(MemError::config(
                "default_vector_dimensions must be greater than 0",
            ));
        }
        if self.hnsw.max_nb_connection == 0 {
            return Err(MemError::config("hnsw.max_nb_connection must be greater than 0"));
        }
        if self.hnsw.ef_construction == 0 {
            return Err(MemError::config("hnsw.ef_construction must be greater than 0"));
        }
        if self.hnsw.ef_search == 0 {
            return Err(MemError::config("hnsw.ef_search must be greater than 0"));
        }
        Ok(())
    }
}

/// Configuration for the per-user HNSW index.
///
/// Mirrors the capacity and quality knobs of the underlying `hnsw_rs`
/// graph. Initial capacity is 1,000 points (§4.3); the engine grows
/// geometrically on demand.
#[derive(Clone, Debug)]
pub struct HnswConfig {
    /// Maximum bidirectional connections per node (M parameter). Default: 16.
    pub max_nb_connection: usize,

    /// Candidates tracked during index construction. Default: 200.
    pub ef_construction: usize,

    /// Candidates tracked during search. Default: 50.
    pub ef_search: usize,

    /// Maximum number of layers in the skip-list structure. Default: 16.
    pub max_layer: usize,

    /// Initial pre-allocated capacity (number of vectors). Default: 1,000.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 50,
            max_layer: 16,
            max_elements: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch, 50);
        assert_eq!(config.batch_delay, Duration::from_secs(5));
        assert_eq!(config.cache_ttl, Duration::from_secs(30 * 60));
    }

    #[test]
    fn rejects_zero_max_batch() {
        let config = Config {
            max_batch: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("max_batch"));
    }

    #[test]
    fn rejects_zero_batch_delay() {
        let config = Config {
            batch_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_dimensions() {
        let config = Config {
            default_vector_dimensions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn hnsw_config_defaults() {
        let config = HnswConfig::default();
        assert_eq!(config.max_nb_connection, 16);
        assert_eq!(config.max_elements, 1_000);
    }

    #[test]
    fn rejects_zero_hnsw_ef_search() {
        let config = Config {
            hnsw: HnswConfig {
                ef_search: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
