use super::params::{DEFAULT_MAX_ADD_COUNT, DEFAULT_QUEUE_CAPACITY};

/// Worker counts and queue bound of the staged search pipeline.
///
/// Chain evaluation, token derivation, store lookup and unmasking each get their own set of workers, connected by
/// bounded queues. This decouples I/O bound lookups from CPU bound cryptography.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub eval_threads: usize,
    pub derive_threads: usize,
    pub lookup_threads: usize,
    pub assemble_threads: usize,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            eval_threads: 2,
            derive_threads: 1,
            lookup_threads: 1,
            assemble_threads: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// How a search walks the keyword's chain. All strategies return the same multiset of results.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// One evaluation after another, on the calling thread.
    #[default]
    Sequential,
    /// Chain split into interleaved stripes, each walked end-to-end by one task on the orchestrator's pool.
    Striped { stripes: usize },
    /// Separate worker sets per stage, connected by bounded queues.
    Staged(PipelineConfig),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Size of the worker pool backing striped searches.
    pub pool_threads: usize,
    /// Strategy used by the collecting search entry points of the Janus server.
    pub strategy: SearchStrategy,
    /// Requests asking to replay longer chains are rejected.
    pub max_add_count: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            pool_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            strategy: SearchStrategy::default(),
            max_add_count: DEFAULT_MAX_ADD_COUNT,
        }
    }
}

impl SearchConfig {
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_pool_threads(mut self, pool_threads: usize) -> Self {
        self.pool_threads = pool_threads;
        self
    }

    pub fn with_max_add_count(mut self, max_add_count: u32) -> Self {
        self.max_add_count = max_add_count;
        self
    }
}
