//! Tag-based grouped invalidation.

use crate::driver::Driver;
use crate::error::{CacheError, CacheResult};
use crate::expire::Expire;
use keeper_log::debug;
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::{Arc, Weak};

/// A group of cache keys sharing one or more tags.
///
/// Obtained from [`Driver::tag`]. Every write through a tag set records the
/// written key in each tag's member list, so [`TagSet::clear`] can remove
/// the whole group at once.
///
/// # Examples
///
/// ```
/// use keeper_cache::{Driver, MemoryHandler, StoreConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let driver = Arc::new(Driver::new("local", StoreConfig::memory(), Arc::new(MemoryHandler::new())));
/// let users = driver.tag("users");
///
/// users.set("user:1", "alice", None).await.unwrap();
/// users.set("user:2", "bob", None).await.unwrap();
///
/// users.clear().await.unwrap();
/// assert!(!driver.has("user:1").await.unwrap());
/// # }
/// ```
#[derive(Debug)]
pub struct TagSet {
    names: Vec<String>,
    driver: Weak<Driver>,
}

impl TagSet {
    pub(crate) fn new(names: Vec<String>, driver: Weak<Driver>) -> Self {
        Self { names, driver }
    }

    /// Tag names in the order they were given.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn driver(&self) -> CacheResult<Arc<Driver>> {
        self.driver.upgrade().ok_or(CacheError::DriverDropped)
    }

    /// Write `value` under `name` and register it with every tag.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        expire: Option<Expire>,
    ) -> CacheResult<bool> {
        let stored = self.driver()?.set(name, value, expire).await?;
        self.append(name).await?;
        Ok(stored)
    }

    /// Register `name` with every tag without writing a value.
    pub async fn append(&self, name: &str) -> CacheResult<()> {
        let driver = self.driver()?;
        let key = driver.cache_key(name);

        for tag in &self.names {
            driver.push(&driver.tag_key(tag), &key).await?;
        }
        Ok(())
    }

    /// Write several entries, stopping at the first refused write.
    pub async fn set_multiple<I, K, V>(&self, items: I, expire: Option<Expire>) -> CacheResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        for (key, value) in items {
            if !self.set(key.as_ref(), &value, expire).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// [`Driver::remember`], then register `name` with every tag.
    ///
    /// Registration also happens on a hit; member lists never hold
    /// duplicates so this is idempotent.
    pub async fn remember<T>(&self, name: &str, value: T, expire: Option<Expire>) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let result = self.driver()?.remember(name, value, expire).await?;
        self.append(name).await?;
        Ok(result)
    }

    /// [`Driver::remember_with`], then register `name` with every tag.
    pub async fn remember_with<T, F, Fut>(
        &self,
        name: &str,
        compute: F,
        expire: Option<Expire>,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let result = self.driver()?.remember_with(name, compute, expire).await?;
        self.append(name).await?;
        Ok(result)
    }

    /// Delete every key registered under these tags, then the member lists.
    ///
    /// Not atomic: a backend failure part way leaves earlier tags cleared.
    pub async fn clear(&self) -> CacheResult<bool> {
        let driver = self.driver()?;

        for tag in &self.names {
            let members = driver.tag_members(tag).await?;
            debug!(target: "keeper::tag", "clearing {} keys tagged {}", members.len(), tag);

            driver.handler().clear_tag(&members).await?;
            driver.delete(&driver.tag_key(tag)).await?;
        }
        Ok(true)
    }
}
