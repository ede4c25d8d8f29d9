mod resolve;

/// Default soft cap on cached vectors, matching an effectively unbounded
/// cache unless the operator says otherwise.
pub const DEFAULT_VECTOR_CACHE_MAX_OBJECTS: i64 = 1_000_000_000_000;

#[derive(Clone, Debug)]
pub struct Config {
    pub vector_cache_max_objects: i64,
    pub prefill_cache_on_startup: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let vector_cache_max_objects = resolve::resolve_vector_cache_max_objects();
        if vector_cache_max_objects <= 0 {
            anyhow::bail!(
                "VECTOR_CACHE_MAX_OBJECTS must be positive, got {vector_cache_max_objects}"
            );
        }

        Ok(Self {
            vector_cache_max_objects,
            prefill_cache_on_startup: resolve::resolve_prefill_cache_on_startup(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vector_cache_max_objects: DEFAULT_VECTOR_CACHE_MAX_OBJECTS,
            prefill_cache_on_startup: true,
        }
    }
}
