mod sharded;

pub use sharded::ShardedLockCache;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("id not found")]
    IdNotFound,
    #[error("load cancelled")]
    Cancelled,
    #[error("source error: {0}")]
    Source(#[from] std::io::Error),
}

/// Read-only seam to wherever vectors actually live (commit log, object
/// store, …). The cache consults it on a miss; everything else stays behind
/// this trait so tests can swap in fixtures.
pub trait VectorSource: Send + Sync {
    fn vector(&self, id: u64) -> Result<Vec<f32>, CacheError>;
}

/// In-memory vector cache guarding the hot path of distance calculations.
///
/// `load` is read-through: a hit returns the cached vector, a miss consults
/// the [`VectorSource`] and admits the result. The cache never evicts; the
/// max size is a soft cap that admission-heavy callers (the prefiller) clamp
/// their budgets against.
pub trait VectorCache: Send + Sync {
    /// Return the vector for `id`, admitting it on a miss.
    fn load(&self, ctx: &CancellationToken, id: u64) -> Result<Arc<[f32]>, CacheError>;

    /// Admit a vector without consulting the source. Build paths use this
    /// when they already hold the vector in hand.
    fn preload(&self, id: u64, vector: Vec<f32>);

    /// Drop a single entry, if present.
    fn delete(&self, ctx: &CancellationToken, id: u64);

    /// Number of vectors currently admitted.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn count_vectors(&self) -> i64;

    /// Soft cap on admitted vectors. Advisory; `load` does not enforce it.
    fn current_capacity(&self) -> i64;

    fn update_max_size(&self, size: i64);

    /// Clear every shard.
    fn drop_all(&self);
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSettings {
    pub max_objects: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_objects: crate::config::DEFAULT_VECTOR_CACHE_MAX_OBJECTS,
        }
    }
}

impl CacheSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_objects: config.vector_cache_max_objects.max(1),
        }
    }
}

/// Point-in-time cache counters, for admin/status surfaces.
#[derive(Clone, Debug, Serialize)]
pub struct CacheStats {
    pub count: i64,
    pub max_objects: i64,
}
