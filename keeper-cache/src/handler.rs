//! Backend handler trait definition.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::any::Any;
use std::time::Duration;

/// Primitive operations a storage backend provides.
///
/// Handlers see fully-qualified keys (store prefix already applied) and
/// opaque string payloads; prefixing, serialization, memoization and tagging
/// all happen in [`Driver`](crate::Driver).
#[async_trait]
pub trait CacheHandler: Send + Sync {
    /// Backend name for logging, e.g. `"memory"` or `"redis"`.
    fn name(&self) -> &'static str;

    /// Check whether a live entry exists.
    async fn has(&self, key: &str) -> CacheResult<bool>;

    /// Read a payload.
    ///
    /// Returns `Ok(None)` for missing or expired entries.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a payload.
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The encoded payload
    /// * `ttl` - Time-to-live, `None` for a permanent entry
    ///
    /// Returns `Ok(false)` when the backend refused the write.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Remove an entry. Returns whether something was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every entry.
    ///
    /// **Warning:** Backends shared between stores lose all of their data.
    async fn clear(&self) -> CacheResult<bool>;

    /// Add `step` to a numeric entry, creating it from zero when missing.
    ///
    /// Returns the new value.
    async fn inc(&self, key: &str, step: i64) -> CacheResult<i64>;

    /// Subtract `step` from a numeric entry.
    async fn dec(&self, key: &str, step: i64) -> CacheResult<i64> {
        let step = step.checked_neg().ok_or_else(|| {
            CacheError::Type(format!("decrement of '{}' overflows", key))
        })?;
        self.inc(key, step).await
    }

    /// Remove a batch of keys, ignoring keys that are already gone.
    async fn clear_tag(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Access the concrete handler for backend-specific operations.
    fn as_any(&self) -> &dyn Any;
}
