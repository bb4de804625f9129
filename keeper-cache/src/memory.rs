//! Process-local memory backend.

use crate::error::{CacheError, CacheResult};
use crate::handler::CacheHandler;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// In-memory handler. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryHandler {
    data: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.data.write().await.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl CacheHandler for MemoryHandler {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        self.get(key).await.map(|v| v.is_some())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let data = self.data.read().await;
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        // A TTL past the clock's range never expires.
        let expires_at = ttl.and_then(|d| Instant::now().checked_add(d));
        self.data
            .write()
            .await
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> CacheResult<bool> {
        self.data.write().await.clear();
        Ok(true)
    }

    async fn inc(&self, key: &str, step: i64) -> CacheResult<i64> {
        let mut data = self.data.write().await;
        let now = Instant::now();

        let (current, expires_at) = match data.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    CacheError::Type(format!("cannot increment non-numeric entry '{}'", key))
                })?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current.checked_add(step).ok_or_else(|| {
            CacheError::Type(format!("increment of '{}' overflows", key))
        })?;
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn clear_tag(&self, keys: &[String]) -> CacheResult<()> {
        let mut data = self.data.write().await;
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
