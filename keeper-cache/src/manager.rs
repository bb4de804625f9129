//! Store resolution and the default-store convenience API.

use crate::config::{CacheConfig, StoreConfig};
use crate::driver::{Driver, IntoTagNames};
use crate::error::{CacheError, CacheResult};
use crate::expire::Expire;
use crate::file::FileHandler;
use crate::handler::CacheHandler;
use crate::memory::MemoryHandler;
use crate::tag_set::TagSet;
use keeper_log::debug;
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "redis")]
use crate::redis_cache::RedisHandler;

/// Builds a backend handler from a store's configuration.
pub type HandlerFactory =
    Arc<dyn Fn(&StoreConfig) -> CacheResult<Arc<dyn CacheHandler>> + Send + Sync>;

/// Builds a whole driver for a store, bypassing the handler registry.
///
/// Receives the store name and its configuration.
pub type DriverCreator =
    Arc<dyn Fn(&str, &StoreConfig) -> CacheResult<Arc<Driver>> + Send + Sync>;

#[cfg(feature = "redis")]
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Resolves store names to drivers.
///
/// Drivers are built on first use from the store's configuration and cached
/// by name for the manager's lifetime. Backend kinds are looked up
/// case-insensitively, first among the creators installed with
/// [`CacheManager::extend`], then in the handler registry.
///
/// # Examples
///
/// ```
/// use keeper_cache::{CacheConfig, CacheManager, StoreConfig};
/// use std::sync::Arc;
///
/// let config = CacheConfig::new()
///     .with_default("local")
///     .with_store("local", StoreConfig::memory().with_prefix("app:"));
/// let manager = CacheManager::new(config);
///
/// let local = manager.resolve(None).unwrap();
/// assert!(Arc::ptr_eq(&local, &manager.store("local").unwrap()));
/// ```
pub struct CacheManager {
    config: CacheConfig,
    registry: HashMap<String, HandlerFactory>,
    creators: HashMap<String, DriverCreator>,
    drivers: RwLock<HashMap<String, Arc<Driver>>>,
}

impl CacheManager {
    /// Create a manager with the built-in backends registered.
    pub fn new(config: CacheConfig) -> Self {
        let mut manager = Self {
            config,
            registry: HashMap::new(),
            creators: HashMap::new(),
            drivers: RwLock::new(HashMap::new()),
        };

        manager.register("memory", |_| {
            let handler: Arc<dyn CacheHandler> = Arc::new(MemoryHandler::new());
            Ok(handler)
        });
        manager.register("file", |config| {
            let root = config.path.clone().unwrap_or_else(FileHandler::default_root);
            let handler: Arc<dyn CacheHandler> = Arc::new(FileHandler::new(root));
            Ok(handler)
        });
        #[cfg(feature = "redis")]
        manager.register("redis", |config| {
            let url = config.url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
            let handler: Arc<dyn CacheHandler> = Arc::new(RedisHandler::new(url)?);
            Ok(handler)
        });

        manager
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Register a backend kind.
    ///
    /// Replaces an existing registration of the same kind.
    pub fn register<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn(&StoreConfig) -> CacheResult<Arc<dyn CacheHandler>> + Send + Sync + 'static,
    {
        self.registry
            .insert(kind.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// Install a construction override for a backend kind.
    ///
    /// The creator builds the whole driver and takes precedence over the
    /// handler registry.
    pub fn extend<F>(&mut self, kind: &str, creator: F) -> &mut Self
    where
        F: Fn(&str, &StoreConfig) -> CacheResult<Arc<Driver>> + Send + Sync + 'static,
    {
        self.creators
            .insert(kind.to_ascii_lowercase(), Arc::new(creator));
        self
    }

    /// Whether a backend kind can be built.
    pub fn supports(&self, kind: &str) -> bool {
        let kind = kind.to_ascii_lowercase();
        self.creators.contains_key(&kind) || self.registry.contains_key(&kind)
    }

    /// Name of the default store, if configured.
    pub fn default_store(&self) -> Option<&str> {
        self.config.default.as_deref().filter(|name| !name.is_empty())
    }

    /// Get the driver for `name`, or for the default store when `name` is
    /// `None` or empty.
    pub fn resolve(&self, name: Option<&str>) -> CacheResult<Arc<Driver>> {
        let name = name
            .filter(|name| !name.is_empty())
            .or_else(|| self.default_store())
            .ok_or_else(|| {
                CacheError::Config("Unable to resolve NULL driver for [CacheManager].".to_string())
            })?;

        if let Some(driver) = self.drivers.read().get(name) {
            return Ok(driver.clone());
        }

        let driver = self.create_driver(name)?;
        Ok(self
            .drivers
            .write()
            .entry(name.to_string())
            .or_insert(driver)
            .clone())
    }

    /// Get the driver for a named store.
    pub fn store(&self, name: &str) -> CacheResult<Arc<Driver>> {
        self.resolve(Some(name))
    }

    fn create_driver(&self, name: &str) -> CacheResult<Arc<Driver>> {
        let config = self.config.store(name)?;
        let kind = match config.kind.trim() {
            "" => "file".to_string(),
            kind => kind.to_ascii_lowercase(),
        };

        if let Some(creator) = self.creators.get(&kind) {
            debug!(target: "keeper::manager", "building store {} with custom {} creator", name, kind);
            return creator(name, config);
        }

        let factory = self.registry.get(&kind).ok_or_else(|| {
            CacheError::Config(format!("Driver [{}] not supported.", config.kind))
        })?;
        let handler = factory(config)?;

        debug!(target: "keeper::manager", "resolved store {} ({})", name, handler.name());
        Ok(Arc::new(Driver::new(name, config.clone(), handler)))
    }

    // ========== Default store ==========

    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> CacheResult<Option<T>> {
        self.resolve(None)?.get(name).await
    }

    pub async fn get_value(&self, name: &str, default: Value) -> CacheResult<Value> {
        self.resolve(None)?.get_value(name, default).await
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        expire: Option<Expire>,
    ) -> CacheResult<bool> {
        self.resolve(None)?.set(name, value, expire).await
    }

    pub async fn delete(&self, name: &str) -> CacheResult<bool> {
        self.resolve(None)?.delete(name).await
    }

    pub async fn has(&self, name: &str) -> CacheResult<bool> {
        self.resolve(None)?.has(name).await
    }

    pub async fn clear(&self) -> CacheResult<bool> {
        self.resolve(None)?.clear().await
    }

    pub async fn get_multiple<I, K>(&self, keys: I, default: Value) -> CacheResult<Vec<(String, Value)>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.resolve(None)?.get_multiple(keys, default).await
    }

    pub async fn set_multiple<I, K, V>(&self, items: I, expire: Option<Expire>) -> CacheResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        self.resolve(None)?.set_multiple(items, expire).await
    }

    pub async fn delete_multiple<I, K>(&self, keys: I) -> CacheResult<bool>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.resolve(None)?.delete_multiple(keys).await
    }

    pub async fn pull(&self, name: &str) -> CacheResult<Value> {
        self.resolve(None)?.pull(name).await
    }

    pub async fn push<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CacheResult<()> {
        self.resolve(None)?.push(name, value).await
    }

    pub fn tag(&self, names: impl IntoTagNames) -> CacheResult<Arc<TagSet>> {
        Ok(self.resolve(None)?.tag(names))
    }

    /// [`Driver::remember`] on the default store.
    ///
    /// Failures are wrapped in [`CacheError::Remember`].
    pub async fn remember<T>(&self, name: &str, value: T, expire: Option<Expire>) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.resolve(None)?
            .remember(name, value, expire)
            .await
            .map_err(|e| CacheError::remember(name, e))
    }

    /// [`Driver::remember_with`] on the default store.
    ///
    /// Failures are wrapped in [`CacheError::Remember`].
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
        self.resolve(None)?
            .remember_with(name, compute, expire)
            .await
            .map_err(|e| CacheError::remember(name, e))
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.registry.keys().collect();
        kinds.sort();
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("kinds", &kinds)
            .field("resolved", &self.drivers.read().len())
            .finish()
    }
}
