use super::{CacheError, CacheSettings, CacheStats, VectorCache, VectorSource};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stripe width for the cache shards. Power of two so the shard pick
/// compiles to a bit-mask. Fixed for the lifetime of the cache.
pub const CACHE_LOCK_STRIPE: u64 = 128;

/// The production [`VectorCache`]: vectors striped over fixed read/write
/// locked shards by `id % CACHE_LOCK_STRIPE`, misses read through the
/// backing [`VectorSource`].
pub struct ShardedLockCache {
    shards: Vec<RwLock<HashMap<u64, Arc<[f32]>>>>,
    count: AtomicI64,
    max_size: AtomicI64,
    source: Arc<dyn VectorSource>,
}

impl ShardedLockCache {
    pub fn new(source: Arc<dyn VectorSource>, settings: CacheSettings) -> Self {
        let shards = (0..CACHE_LOCK_STRIPE)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            count: AtomicI64::new(0),
            max_size: AtomicI64::new(settings.max_objects.max(1)),
            source,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.count.load(Ordering::Relaxed),
            max_objects: self.max_size.load(Ordering::Relaxed),
        }
    }

    fn shard(&self, id: u64) -> &RwLock<HashMap<u64, Arc<[f32]>>> {
        &self.shards[(id % CACHE_LOCK_STRIPE) as usize]
    }
}

impl VectorCache for ShardedLockCache {
    fn load(&self, ctx: &CancellationToken, id: u64) -> Result<Arc<[f32]>, CacheError> {
        if let Some(vector) = self.shard(id).read().get(&id) {
            return Ok(vector.clone());
        }
        if ctx.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        // The source read stays outside the shard lock; a slow source must
        // not block writers on the same shard.
        let vector: Arc<[f32]> = self.source.vector(id)?.into();

        let mut shard = self.shard(id).write();
        match shard.entry(id) {
            // a racing load already admitted this id
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(vector.clone());
                self.count.fetch_add(1, Ordering::Relaxed);
                Ok(vector)
            }
        }
    }

    fn preload(&self, id: u64, vector: Vec<f32>) {
        let mut shard = self.shard(id).write();
        if shard.insert(id, vector.into()).is_none() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn delete(&self, _ctx: &CancellationToken, id: u64) {
        let mut shard = self.shard(id).write();
        if shard.remove(&id).is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    fn count_vectors(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    fn current_capacity(&self) -> i64 {
        self.max_size.load(Ordering::Relaxed)
    }

    fn update_max_size(&self, size: i64) {
        self.max_size.store(size.max(1), Ordering::Relaxed);
    }

    fn drop_all(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
        self.count.store(0, Ordering::Relaxed);
    }
}
