//! Redis backend.

use crate::error::{CacheError, CacheResult};
use crate::handler::CacheHandler;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::any::Any;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Redis handler.
///
/// The connection is opened on first use, so building a handler never
/// touches the network.
pub struct RedisHandler {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisHandler {
    /// Create a handler for `url`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keeper_cache::RedisHandler;
    ///
    /// let handler = RedisHandler::new("redis://localhost:6379").unwrap();
    /// ```
    pub fn new(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|e| CacheError::Config(e.to_string()))?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    /// Get the underlying connection manager, connecting if needed.
    pub async fn connection(&self) -> CacheResult<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| CacheError::Backend(format!("redis connect failed: {}", e)))
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheHandler for RedisHandler {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut conn = self.connection().await?;

        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(true)
    }

    async fn inc(&self, key: &str, step: i64) -> CacheResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = conn.incr(key, step).await?;
        Ok(value)
    }

    async fn dec(&self, key: &str, step: i64) -> CacheResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = conn.decr(key, step).await?;
        Ok(value)
    }

    async fn clear_tag(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(keys.to_vec()).await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
