// Keeper - backend-agnostic caching for Rust
//
// This library resolves named cache stores to drivers over interchangeable
// backends, with tag-based invalidation and stampede-protected memoization.

// Re-export member crates
pub use keeper_cache as cache;
pub use keeper_log as log;

// Re-export core functionality
pub use keeper_cache::{
    CacheConfig, CacheError, CacheHandler, CacheManager, CacheResult, Driver, Expire, FileHandler,
    MemoryHandler, StoreConfig, TagSet, Value,
};

#[cfg(feature = "redis")]
pub use keeper_cache::RedisHandler;

// Prelude for common imports
pub mod prelude {
    pub use keeper_cache::prelude::*;
    pub use serde_json::json;
}
