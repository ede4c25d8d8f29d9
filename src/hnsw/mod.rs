//! The in-memory side of the HNSW index: the striped vertex table the
//! traversal code reads, and the index shell that wires it to the vector
//! cache.

mod prefiller;

pub use prefiller::VectorCachePrefiller;

use crate::cache::{CacheSettings, ShardedLockCache, VectorCache, VectorSource};
use crate::config::Config;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Number of read/write locks striped over the vertex table. Power of two so
/// the stripe pick compiles to a bit-mask; fixed for the lifetime of the
/// graph.
pub const NODE_LOCK_STRIPE: usize = 128;

/// A graph vertex. `level` is the uppermost layer the vertex participates
/// in; it is present on every layer below that.
#[derive(Clone, Copy, Debug)]
pub struct Vertex {
    pub id: u64,
    pub level: usize,
}

/// Read-only window onto the vertex table, as consumed by traversal code.
///
/// `level_of` observes the stripe-lock discipline: implementations take the
/// shared lock for `id`'s stripe only, never the whole table.
pub trait GraphView: Send + Sync {
    /// One past the highest assigned id. Ids are dense, starting at 0.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound on every vertex's level.
    fn max_layer(&self) -> usize;

    /// Current level of `id`, or `None` for an unassigned slot. Levels above
    /// [`GraphView::max_layer`] indicate an upstream bug and are clamped.
    fn level_of(&self, id: u64) -> Option<usize>;

    fn shard_count(&self) -> usize;
}

/// The vertex table. Vertices are striped over [`NODE_LOCK_STRIPE`] locks by
/// `id % stripe`; readers take the stripe in shared mode, mutators in
/// exclusive mode. The table is append-only: `push` hands out dense ids and
/// the vertex at id `i` keeps `id == i` forever.
pub struct NodeStore {
    stripes: Vec<RwLock<Vec<Option<Vertex>>>>,
    len: AtomicUsize,
    max_layer: AtomicUsize,
}

impl NodeStore {
    pub fn new() -> Self {
        let stripes = (0..NODE_LOCK_STRIPE).map(|_| RwLock::new(Vec::new())).collect();
        Self {
            stripes,
            len: AtomicUsize::new(0),
            max_layer: AtomicUsize::new(0),
        }
    }

    /// Append a vertex with the given level and return its id.
    ///
    /// The maximum layer is raised before the vertex becomes visible, so a
    /// concurrent reader can never observe a vertex above `max_layer`.
    pub fn push(&self, level: usize) -> u64 {
        let id = self.len.fetch_add(1, Ordering::SeqCst) as u64;
        self.max_layer.fetch_max(level, Ordering::SeqCst);

        let slot = (id as usize) / NODE_LOCK_STRIPE;
        let mut stripe = self.stripe(id).write();
        if stripe.len() <= slot {
            stripe.resize(slot + 1, None);
        }
        stripe[slot] = Some(Vertex { id, level });
        id
    }

    fn stripe(&self, id: u64) -> &RwLock<Vec<Option<Vertex>>> {
        &self.stripes[(id as usize) % NODE_LOCK_STRIPE]
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphView for NodeStore {
    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    fn max_layer(&self) -> usize {
        self.max_layer.load(Ordering::SeqCst)
    }

    fn level_of(&self, id: u64) -> Option<usize> {
        let slot = (id as usize) / NODE_LOCK_STRIPE;
        let vertex = {
            let stripe = self.stripe(id).read();
            stripe.get(slot).copied().flatten()?
        };
        let max = self.max_layer();
        debug_assert!(
            vertex.level <= max,
            "vertex {} has level {} above current maximum layer {}",
            vertex.id,
            vertex.level,
            max
        );
        Some(vertex.level.min(max))
    }

    fn shard_count(&self) -> usize {
        NODE_LOCK_STRIPE
    }
}

/// Shell tying one index's vertex table to its vector cache.
pub struct HnswIndex {
    nodes: Arc<NodeStore>,
    cache: Arc<ShardedLockCache>,
    shutdown: CancellationToken,
    prefill_on_startup: bool,
}

impl HnswIndex {
    pub fn new(
        source: Arc<dyn VectorSource>,
        settings: CacheSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            nodes: Arc::new(NodeStore::new()),
            cache: Arc::new(ShardedLockCache::new(source, settings)),
            shutdown,
            prefill_on_startup: true,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn VectorSource>,
        shutdown: CancellationToken,
    ) -> Self {
        let mut index = Self::new(source, CacheSettings::from_config(config), shutdown);
        index.prefill_on_startup = config.prefill_cache_on_startup;
        index
    }

    pub fn nodes(&self) -> &Arc<NodeStore> {
        &self.nodes
    }

    pub fn cache(&self) -> &Arc<ShardedLockCache> {
        &self.cache
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Called once the vertex table has been restored; warms the vector
    /// cache when enabled.
    pub fn finish_restore(&self) {
        if self.prefill_on_startup {
            self.prefill_cache();
        }
    }

    /// Warm the vector cache up to its current capacity. Inside a tokio
    /// runtime the prefill runs on a blocking task and this returns
    /// immediately; otherwise it runs on the caller's thread.
    pub fn prefill_cache(&self) {
        let limit = self.cache.current_capacity().max(0) as usize;
        let cache = self.cache.clone();
        let nodes = self.nodes.clone();
        let shutdown = self.shutdown.clone();

        if tokio::runtime::Handle::try_current().is_err() {
            VectorCachePrefiller::new(cache, nodes).prefill(&shutdown, limit);
            return;
        }

        tokio::spawn(async move {
            let res = tokio::task::spawn_blocking(move || {
                VectorCachePrefiller::new(cache, nodes).prefill(&shutdown, limit);
            })
            .await;
            if let Err(err) = res {
                tracing::warn!(error = %err, "cache prefill task join failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_dense_ids() {
        let nodes = NodeStore::new();
        for expected in 0..300u64 {
            assert_eq!(nodes.push(0), expected);
        }
        assert_eq!(nodes.len(), 300);
        for id in 0..300u64 {
            assert_eq!(nodes.level_of(id), Some(0));
        }
        assert_eq!(nodes.level_of(300), None);
    }

    #[test]
    fn max_layer_tracks_the_highest_level() {
        let nodes = NodeStore::new();
        nodes.push(0);
        assert_eq!(nodes.max_layer(), 0);
        nodes.push(4);
        nodes.push(2);
        assert_eq!(nodes.max_layer(), 4);
        assert_eq!(nodes.level_of(1), Some(4));
        assert_eq!(nodes.shard_count(), NODE_LOCK_STRIPE);
    }

    #[test]
    fn concurrent_pushes_keep_every_slot() {
        let nodes = Arc::new(NodeStore::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let nodes = nodes.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    nodes.push(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(nodes.len(), 2000);
        for id in 0..2000u64 {
            assert_eq!(nodes.level_of(id), Some(1));
        }
    }
}
