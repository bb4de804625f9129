//! Named cache stores for Keeper.
//!
//! Provides one caching API over interchangeable backends, with a manager
//! that resolves store names to drivers, tag-based group invalidation and
//! stampede-protected memoization.
//!
//! # Features
//!
//! - `redis` - Enable the Redis backend (enabled by default)
//! - **Named stores** - Each store binds a backend kind, key prefix and defaults
//! - **Tag-based invalidation** - Clear every entry written under a tag
//! - **Memoization** - `remember` computes once and waits on other callers
//! - **List entries** - Capped, de-duplicated append
//!
//! # Examples
//!
//! ## Resolving stores
//!
//! ```no_run
//! use keeper_cache::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let config = CacheConfig::from_file("cache.toml")?.with_env_overrides();
//!     let manager = CacheManager::new(config);
//!
//!     manager.set("greeting", "hello", Some(Expire::from(60u64))).await?;
//!     let sessions = manager.store("sessions")?;
//!     sessions.inc("active", 1).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Memoization
//!
//! ```no_run
//! use keeper_cache::*;
//!
//! # async fn example(manager: CacheManager) -> Result<(), CacheError> {
//! let total: u64 = manager
//!     .remember_with("orders:total", || async { Ok(1250) }, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Tag-based Invalidation
//!
//! ```no_run
//! use keeper_cache::*;
//!
//! # async fn example(manager: CacheManager) -> Result<(), CacheError> {
//! let users = manager.tag(["users", "profiles"])?;
//! users.set("user:123", &serde_json::json!({"name": "Alice"}), None).await?;
//!
//! // Removes user:123 and everything else written under either tag
//! users.clear().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod expire;
pub mod file;
pub mod handler;
pub mod manager;
pub mod memory;
pub mod serializer;
pub mod tag_set;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use config::{CacheConfig, FileFormat, StoreConfig};
pub use driver::{Driver, IntoTagNames};
pub use error::{CacheError, CacheResult};
pub use expire::Expire;
pub use file::FileHandler;
pub use handler::CacheHandler;
pub use manager::{CacheManager, DriverCreator, HandlerFactory};
pub use memory::MemoryHandler;
pub use serializer::{FnSerializer, JsonSerializer, Serializer};
pub use serde_json::Value;
pub use tag_set::TagSet;

#[cfg(feature = "redis")]
pub use redis_cache::RedisHandler;

/// Common imports.
pub mod prelude {
    pub use crate::{
        CacheConfig, CacheError, CacheHandler, CacheManager, CacheResult, Driver, Expire,
        StoreConfig, TagSet, Value,
    };
}
