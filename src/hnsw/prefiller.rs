use super::GraphView;
use crate::cache::VectorCache;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Warms a [`VectorCache`] by walking the vertex table from the top graph
/// layer down, issuing one read-through load per vertex until a budget is
/// met.
///
/// Upper-layer vertices are few and serve as the entrypoints of every
/// search, so they are loaded first; within a layer ids are visited in
/// ascending order. Given the same table and limit, the sequence of loads is
/// fully deterministic.
pub struct VectorCachePrefiller<C: ?Sized, G: ?Sized> {
    cache: Arc<C>,
    graph: Arc<G>,
}

impl<C, G> VectorCachePrefiller<C, G>
where
    C: VectorCache + ?Sized,
    G: GraphView + ?Sized,
{
    pub fn new(cache: Arc<C>, graph: Arc<G>) -> Self {
        Self { cache, graph }
    }

    /// Issue up to `min(limit, cache capacity)` cache loads, best effort.
    ///
    /// Cancellation is polled between vertices; on cancellation the call
    /// returns promptly with whatever prefix was warmed. Load failures are
    /// logged at debug, counted against the budget, and never abort the
    /// walk.
    pub fn prefill(&self, ctx: &CancellationToken, limit: usize) {
        let before = Instant::now();
        let budget = i64::try_from(limit)
            .unwrap_or(i64::MAX)
            .min(self.cache.current_capacity());
        if budget <= 0 {
            return;
        }
        let budget = budget as usize;

        let mut attempted = 0usize;
        for layer in (0..=self.graph.max_layer()).rev() {
            if !self.prefill_layer(ctx, layer, budget, &mut attempted) {
                break;
            }
        }

        tracing::debug!(
            count = attempted,
            limit,
            took = ?before.elapsed(),
            "prefilled vector cache"
        );
    }

    /// Load every not-yet-loaded vertex of `layer`, ascending by id. Returns
    /// false once the budget is spent or the context is cancelled.
    fn prefill_layer(
        &self,
        ctx: &CancellationToken,
        layer: usize,
        budget: usize,
        attempted: &mut usize,
    ) -> bool {
        let before = Instant::now();
        let mut layer_count = 0usize;

        for id in 0..self.graph.len() as u64 {
            if ctx.is_cancelled() {
                return false;
            }
            if *attempted >= budget {
                return false;
            }
            // A vertex is admitted on its highest layer only; lower passes
            // skip it. Higher layers ran to completion, or we would have
            // returned above.
            let Some(level) = self.graph.level_of(id) else {
                continue;
            };
            if level != layer {
                continue;
            }

            if let Err(err) = self.cache.load(ctx, id) {
                tracing::debug!(id, error = %err, "prefill load failed");
            }
            *attempted += 1;
            layer_count += 1;
        }

        tracing::debug!(
            layer,
            count = layer_count,
            took = ?before.elapsed(),
            "prefilled layer"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::hnsw::NodeStore;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    struct FakeCache {
        store: Mutex<HashSet<u64>>,
    }

    impl FakeCache {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                store: Mutex::new(HashSet::new()),
            })
        }

        fn reset(&self) {
            self.store.lock().clear();
        }

        fn snapshot(&self) -> HashSet<u64> {
            self.store.lock().clone()
        }
    }

    impl VectorCache for FakeCache {
        fn load(&self, _ctx: &CancellationToken, id: u64) -> Result<Arc<[f32]>, CacheError> {
            self.store.lock().insert(id);
            Ok(Vec::new().into())
        }

        fn preload(&self, _id: u64, _vector: Vec<f32>) {
            unimplemented!()
        }

        fn delete(&self, _ctx: &CancellationToken, _id: u64) {
            unimplemented!()
        }

        fn len(&self) -> usize {
            self.store.lock().len()
        }

        fn count_vectors(&self) -> i64 {
            self.len() as i64
        }

        fn current_capacity(&self) -> i64 {
            1_000_000
        }

        fn update_max_size(&self, _size: i64) {
            unimplemented!()
        }

        fn drop_all(&self) {
            unimplemented!()
        }
    }

    // maximum of 3 layers
    // id % 15 == 0 -> layer 3
    // id % 5 == 0  -> layer 2
    // id % 3 == 0  -> layer 1
    // remainder    -> layer 0
    fn level_for_dummy_vertex(id: usize) -> usize {
        if id % 15 == 0 {
            3
        } else if id % 5 == 0 {
            2
        } else if id % 3 == 0 {
            1
        } else {
            0
        }
    }

    fn dummy_graph(amount: usize) -> Arc<NodeStore> {
        let nodes = NodeStore::new();
        for id in 0..amount {
            nodes.push(level_for_dummy_vertex(id));
        }
        Arc::new(nodes)
    }

    fn all_ids_up_to(amount: u64) -> HashSet<u64> {
        (0..amount).collect()
    }

    #[test]
    fn prefill_with_limit_covering_the_whole_graph() {
        let cache = FakeCache::new();
        let pf = VectorCachePrefiller::new(cache.clone(), dummy_graph(100));

        cache.reset();
        pf.prefill(&CancellationToken::new(), 100);
        assert_eq!(cache.snapshot(), all_ids_up_to(100));
    }

    #[test]
    fn prefill_with_small_limit_so_only_the_upper_layer_fits() {
        let cache = FakeCache::new();
        let pf = VectorCachePrefiller::new(cache.clone(), dummy_graph(100));

        cache.reset();
        pf.prefill(&CancellationToken::new(), 7);
        assert_eq!(
            cache.snapshot(),
            HashSet::from([0, 15, 30, 45, 60, 75, 90])
        );
    }

    #[test]
    fn prefill_with_limit_where_a_layer_partially_fits() {
        let cache = FakeCache::new();
        let pf = VectorCachePrefiller::new(cache.clone(), dummy_graph(100));

        cache.reset();
        pf.prefill(&CancellationToken::new(), 10);
        let mut expected: HashSet<u64> = HashSet::from([0, 15, 30, 45, 60, 75, 90]);
        // plus the first three ids of layer 2
        expected.extend([5, 10, 20]);
        assert_eq!(cache.snapshot(), expected);
    }

    #[test]
    fn prefill_with_zero_limit_is_a_no_op() {
        let cache = FakeCache::new();
        let pf = VectorCachePrefiller::new(cache.clone(), dummy_graph(100));

        pf.prefill(&CancellationToken::new(), 0);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn prefill_on_a_flat_graph_loads_ascending_ids() {
        let cache = FakeCache::new();
        let nodes = NodeStore::new();
        for _ in 0..20 {
            nodes.push(0);
        }
        let pf = VectorCachePrefiller::new(cache.clone(), Arc::new(nodes));

        pf.prefill(&CancellationToken::new(), 5);
        assert_eq!(cache.snapshot(), HashSet::from([0, 1, 2, 3, 4]));
    }
}
