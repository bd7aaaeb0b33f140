use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum JanusSSEError {
    // Store
    #[error("Store operation failed with: {0}")]
    StoreIO(String),
    #[error("Stored value has unexpected length, expected {expected} bytes, found {found} bytes")]
    MalformedStoreValue { expected: usize, found: usize },

    // Protocol
    #[error("Search request asks for {add_count} chain elements, but at max {limit} are allowed")]
    AddCountExceedsLimit { add_count: u32, limit: u32 },
    #[error("Per-keyword counter would overflow")]
    CounterOverflow,
    #[error("Persisted client state for keyword is malformed")]
    MalformedClientState,

    // Result cache
    #[error("Insufficient data to deserialize cached result, expected {expected} bytes, found {found} bytes")]
    InsufficientCacheData { expected: usize, found: usize },

    // Token tree
    #[error("Token tree depth {0} is larger than supported maximum")]
    InvalidTreeDepth(u8),
    #[error("Node index {index} is not addressable in a token tree of depth {depth}")]
    NodeIndexOutOfRange { index: u64, depth: u8 },
    #[error("Leaf range [{start}, {end}) is invalid")]
    InvalidLeafRange { start: u64, end: u64 },

    // Concurrency
    #[error("Failed to build worker pool: {0}")]
    ThreadPoolBuild(String),
    #[error("A search worker panicked")]
    WorkerPanicked,
}
