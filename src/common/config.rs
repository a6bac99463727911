use std::time::Duration;

/// Default number of frames in the buffer pool
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default bucket capacity of the extendible hash table
pub const DEFAULT_BUCKET_SIZE: usize = 4;

/// Default K for the LRU-K replacer
pub const DEFAULT_REPLACER_K: usize = 2;

/// Default max entries of an internal B+Tree node
pub const DEFAULT_INTERNAL_MAX_SIZE: usize = 128;

/// Default max size of a leaf B+Tree node (effective capacity is one less)
pub const DEFAULT_LEAF_MAX_SIZE: usize = 128;

/// How often the deadlock detector wakes up
pub const CYCLE_DETECTION_INTERVAL: Duration = Duration::from_millis(50);
