//! Store driver.
//!
//! A [`Driver`] binds one named store to its backend handler and builds the
//! higher-level operations on top of the handler primitives: key prefixing,
//! value encoding, list append with capping, stampede-protected memoization
//! and tag bookkeeping.

use crate::config::StoreConfig;
use crate::error::{CacheError, CacheResult};
use crate::expire::Expire;
use crate::handler::CacheHandler;
use crate::serializer::{self, JsonSerializer, Serializer};
use crate::tag_set::TagSet;
use keeper_log::{debug, warn};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Maximum length of a list entry; appending beyond it evicts the oldest item.
pub const MAX_LIST_LEN: usize = 1000;

/// How long `remember` waits for another caller's lock before proceeding.
pub const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a lock.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Suffix of the lock entry guarding a `remember` computation.
pub const LOCK_SUFFIX: &str = "_lock";

/// Separator joining tag names into a tag-set lookup key.
pub const TAG_DELIMITER: &str = "-";

/// Conversion into an ordered list of tag names.
pub trait IntoTagNames {
    fn into_tag_names(self) -> Vec<String>;
}

impl IntoTagNames for &str {
    fn into_tag_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoTagNames for String {
    fn into_tag_names(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoTagNames for &String {
    fn into_tag_names(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<T: Into<String>> IntoTagNames for Vec<T> {
    fn into_tag_names(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String>, const N: usize> IntoTagNames for [T; N] {
    fn into_tag_names(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: AsRef<str>> IntoTagNames for &[T] {
    fn into_tag_names(self) -> Vec<String> {
        self.iter().map(|t| t.as_ref().to_string()).collect()
    }
}

/// Cache driver for one store.
///
/// Drivers are shared behind an [`Arc`]; [`Driver::tag`] needs the `Arc` so
/// the tag sets it hands out can refer back to it without owning it.
pub struct Driver {
    store: String,
    config: StoreConfig,
    handler: Arc<dyn CacheHandler>,
    serializer: Arc<dyn Serializer>,
    read_times: AtomicU64,
    write_times: AtomicU64,
    tags: Mutex<HashMap<String, Arc<TagSet>>>,
}

impl Driver {
    /// Create a driver for the store `store`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keeper_cache::{Driver, MemoryHandler, StoreConfig};
    /// use std::sync::Arc;
    ///
    /// let driver = Driver::new(
    ///     "local",
    ///     StoreConfig::memory().with_prefix("app:"),
    ///     Arc::new(MemoryHandler::new()),
    /// );
    /// assert_eq!(driver.cache_key("user:1"), "app:user:1");
    /// ```
    pub fn new(
        store: impl Into<String>,
        config: StoreConfig,
        handler: Arc<dyn CacheHandler>,
    ) -> Self {
        let serializer = config
            .serializer
            .clone()
            .unwrap_or_else(|| Arc::new(JsonSerializer));

        Self {
            store: store.into(),
            config,
            handler,
            serializer,
            read_times: AtomicU64::new(0),
            write_times: AtomicU64::new(0),
            tags: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the store this driver serves.
    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Configuration the store was built from.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The backend handler, for operations the driver does not wrap.
    pub fn handler(&self) -> &Arc<dyn CacheHandler> {
        &self.handler
    }

    /// Downcast the backend handler to its concrete type.
    pub fn handler_as<H: CacheHandler + 'static>(&self) -> Option<&H> {
        self.handler.as_any().downcast_ref::<H>()
    }

    /// Number of reads (`has`/`get`) issued so far.
    pub fn read_times(&self) -> u64 {
        self.read_times.load(Ordering::Relaxed)
    }

    /// Number of writes (`set`/`inc`/`dec`/`delete`/`clear`) issued so far.
    pub fn write_times(&self) -> u64 {
        self.write_times.load(Ordering::Relaxed)
    }

    /// Fully-qualified backend key for `name`.
    pub fn cache_key(&self, name: &str) -> String {
        format!("{}{}", self.config.prefix, name)
    }

    /// Logical name of the member-list entry for `tag`.
    pub fn tag_key(&self, tag: &str) -> String {
        let digest = Sha256::digest(tag.as_bytes());
        format!("{}{}", self.config.tag_prefix, hex::encode(digest))
    }

    /// Relative TTL in seconds for an expiration; `0` means permanent.
    pub fn expire_seconds(&self, expire: impl Into<Expire>) -> i64 {
        expire.into().seconds()
    }

    fn count_read(&self) {
        self.read_times.fetch_add(1, Ordering::Relaxed);
    }

    fn count_write(&self) {
        self.write_times.fetch_add(1, Ordering::Relaxed);
    }

    // ========== Pass-through operations ==========

    /// Check whether `name` holds a live entry.
    pub async fn has(&self, name: &str) -> CacheResult<bool> {
        self.count_read();
        self.handler.has(&self.cache_key(name)).await
    }

    async fn read(&self, name: &str) -> CacheResult<Option<Value>> {
        self.count_read();
        match self.handler.get(&self.cache_key(name)).await? {
            Some(payload) => serializer::decode(self.serializer.as_ref(), &payload).map(Some),
            None => Ok(None),
        }
    }

    /// Read `name` as a dynamic value, returning `default` when absent.
    pub async fn get_value(&self, name: &str, default: Value) -> CacheResult<Value> {
        Ok(self.read(name).await?.unwrap_or(default))
    }

    /// Read and deserialize `name`.
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> CacheResult<Option<T>> {
        self.read(name).await?.map(from_value).transpose()
    }

    /// Write `value` under `name`.
    ///
    /// With no `expire`, the store's default TTL applies. An expiration that
    /// resolves to the past removes the entry instead.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        expire: Option<Expire>,
    ) -> CacheResult<bool> {
        let value = to_value(value)?;
        self.write(name, &value, expire).await
    }

    async fn write(&self, name: &str, value: &Value, expire: Option<Expire>) -> CacheResult<bool> {
        self.count_write();
        let key = self.cache_key(name);

        let seconds = match expire {
            Some(expire) => expire.seconds(),
            None => i64::try_from(self.config.expire).unwrap_or(i64::MAX),
        };
        if seconds < 0 {
            self.handler.delete(&key).await?;
            return Ok(true);
        }

        let payload = serializer::encode(self.serializer.as_ref(), value)?;
        let ttl = (seconds > 0).then(|| Duration::from_secs(seconds.unsigned_abs()));
        self.handler.set(&key, payload, ttl).await
    }

    /// Delete `name`. Returns whether an entry was removed.
    pub async fn delete(&self, name: &str) -> CacheResult<bool> {
        self.count_write();
        self.handler.delete(&self.cache_key(name)).await
    }

    /// Clear the whole backend.
    pub async fn clear(&self) -> CacheResult<bool> {
        self.count_write();
        self.handler.clear().await
    }

    /// Add `step` to a numeric entry and return the new value.
    pub async fn inc(&self, name: &str, step: i64) -> CacheResult<i64> {
        self.count_write();
        self.handler.inc(&self.cache_key(name), step).await
    }

    /// Subtract `step` from a numeric entry and return the new value.
    pub async fn dec(&self, name: &str, step: i64) -> CacheResult<i64> {
        self.count_write();
        self.handler.dec(&self.cache_key(name), step).await
    }

    // ========== Higher-level operations ==========

    /// Read `name` and delete it if the value is truthy.
    ///
    /// Returns `false` when absent. Stored falsy values (`false`, `0`, `""`,
    /// `[]`, ...) are returned but left in place. The read and delete are not
    /// atomic.
    pub async fn pull(&self, name: &str) -> CacheResult<Value> {
        let value = self.get_value(name, Value::Bool(false)).await?;
        if is_truthy(&value) {
            self.delete(name).await?;
        }
        Ok(value)
    }

    /// Append `value` to the list stored under `name`.
    ///
    /// The list keeps at most [`MAX_LIST_LEN`] items, dropping the oldest,
    /// and never holds duplicates (first occurrence wins).
    pub async fn push<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CacheResult<()> {
        let value = to_value(value)?;
        let mut items = match self.get_value(name, Value::Array(Vec::new())).await? {
            Value::Array(items) => items,
            _ => {
                return Err(CacheError::Type(
                    "only sequence-valued caches can be appended to".to_string(),
                ));
            }
        };

        items.push(value);
        if items.len() > MAX_LIST_LEN {
            items.remove(0);
        }

        self.write(name, &Value::Array(dedup(items)), None).await?;
        Ok(())
    }

    /// Alias of [`Driver::push`].
    pub async fn append<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CacheResult<()> {
        self.push(name, value).await
    }

    /// Return the cached value of `name`, or store `value` and return it.
    ///
    /// See [`Driver::remember_with`] for the locking behavior.
    pub async fn remember<T>(&self, name: &str, value: T, expire: Option<Expire>) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.remember_with(name, move || async move { Ok(value) }, expire)
            .await
    }

    /// Return the cached value of `name`, or compute, store and return it.
    ///
    /// A hit with a non-null value returns immediately. On a miss the caller
    /// waits up to [`LOCK_WAIT`] for another caller's `<name>_lock` entry to
    /// disappear, then takes the lock, runs `compute`, writes the result and
    /// releases the lock. The lock is advisory: two callers can both pass
    /// the check and compute, in which case the last write wins.
    ///
    /// If computing or writing fails, the lock is released and the original
    /// error is returned.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let report: Report = driver
    ///     .remember_with("report:daily", || async { build_report().await }, Some(Expire::from(600u64)))
    ///     .await?;
    /// ```
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
        if self.has(name).await? {
            let hit = self.get_value(name, Value::Null).await?;
            if !hit.is_null() {
                return from_value(hit);
            }
        }

        let lock = format!("{}{}", name, LOCK_SUFFIX);
        let started = Instant::now();
        let mut contended = false;
        while started.elapsed() < LOCK_WAIT && self.has(&lock).await? {
            if !contended {
                debug!(target: "keeper::driver", "waiting for lock {} on store {}", lock, self.store);
                contended = true;
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
        if contended && started.elapsed() >= LOCK_WAIT {
            warn!(target: "keeper::driver", "lock {} still held after {:?}, proceeding", lock, LOCK_WAIT);
        }

        let lock_expire = Expire::Seconds(i64::try_from(self.config.lock_ttl).unwrap_or(i64::MAX));
        let outcome = async {
            self.write(&lock, &Value::Bool(true), Some(lock_expire))
                .await?;
            let value = compute().await?;
            self.write(name, &to_value(&value)?, expire).await?;
            Ok::<T, CacheError>(value)
        }
        .await;

        match outcome {
            Ok(value) => {
                self.delete(&lock).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(release) = self.delete(&lock).await {
                    warn!(target: "keeper::driver", "failed to release lock {}: {}", lock, release);
                }
                Err(err)
            }
        }
    }

    // ========== Tags ==========

    /// Get the tag set for `names`, creating it on first use.
    ///
    /// Tag sets are cached by their names joined in the given order, so
    /// `["a", "b"]` and `["b", "a"]` are distinct sets. Repeated names are
    /// dropped.
    pub fn tag(self: &Arc<Self>, names: impl IntoTagNames) -> Arc<TagSet> {
        let mut unique: Vec<String> = Vec::new();
        for name in names.into_tag_names() {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        let key = unique.join(TAG_DELIMITER);

        self.tags
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(TagSet::new(unique, Arc::downgrade(self))))
            .clone()
    }

    /// Fully-qualified keys registered under `tag`.
    pub async fn tag_members(&self, tag: &str) -> CacheResult<Vec<String>> {
        let members = self
            .get_value(&self.tag_key(tag), Value::Array(Vec::new()))
            .await?;
        from_value(members)
    }

    // ========== Batch Operations ==========

    /// Read several keys, substituting `default` for missing ones.
    pub async fn get_multiple<I, K>(&self, keys: I, default: Value) -> CacheResult<Vec<(String, Value)>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut result = Vec::new();
        for key in keys {
            let key = key.as_ref();
            let value = self.get_value(key, default.clone()).await?;
            result.push((key.to_string(), value));
        }
        Ok(result)
    }

    /// Write several entries in order.
    ///
    /// Stops at the first refused or failed write; earlier writes stay.
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

    /// Delete several keys in order.
    ///
    /// Stops at the first delete that fails or finds nothing to remove;
    /// earlier deletes stay.
    pub async fn delete_multiple<I, K>(&self, keys: I) -> CacheResult<bool>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            if !self.delete(key.as_ref()).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("store", &self.store)
            .field("handler", &self.handler.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> CacheResult<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: Value) -> CacheResult<T> {
    serde_json::from_value(value).map_err(|e| CacheError::Deserialization(e.to_string()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::MemoryHandler;
    use async_trait::async_trait;
    use serde_json::json;
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;

    /// Memory handler that refuses keys containing `refuse` and fails keys
    /// containing `broken`.
    #[derive(Default)]
    pub(crate) struct PickyHandler {
        inner: MemoryHandler,
    }

    #[async_trait]
    impl CacheHandler for PickyHandler {
        fn name(&self) -> &'static str {
            "picky"
        }

        async fn has(&self, key: &str) -> CacheResult<bool> {
            self.inner.has(key).await
        }

        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
            if key.contains("broken") && !key.ends_with(LOCK_SUFFIX) {
                return Err(CacheError::Backend(format!("write to {} failed", key)));
            }
            if key.contains("refuse") {
                return Ok(false);
            }
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> CacheResult<bool> {
            if key.contains("broken") && !key.ends_with(LOCK_SUFFIX) {
                return Err(CacheError::Backend(format!("delete of {} failed", key)));
            }
            self.inner.delete(key).await
        }

        async fn clear(&self) -> CacheResult<bool> {
            self.inner.clear().await
        }

        async fn inc(&self, key: &str, step: i64) -> CacheResult<i64> {
            self.inner.inc(key, step).await
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub(crate) fn memory_driver() -> Arc<Driver> {
        Arc::new(Driver::new(
            "test",
            StoreConfig::memory().with_prefix("app:"),
            Arc::new(MemoryHandler::new()),
        ))
    }

    fn picky_driver() -> Arc<Driver> {
        Arc::new(Driver::new(
            "picky",
            StoreConfig::memory().with_prefix("app:"),
            Arc::new(PickyHandler::default()),
        ))
    }

    #[test]
    fn test_cache_key_is_prefix_plus_name() {
        let driver = memory_driver();
        assert_eq!(driver.cache_key("user"), "app:user");
        assert_eq!(driver.cache_key("user"), driver.cache_key("user"));
        assert_eq!(driver.cache_key(""), "app:");
    }

    #[test]
    fn test_tag_key_is_stable_hash() {
        let driver = memory_driver();
        let key = driver.tag_key("users");

        assert!(key.starts_with("tag:"));
        assert_eq!(key.len(), "tag:".len() + 64);
        assert_eq!(key, driver.tag_key("users"));
        assert_ne!(key, driver.tag_key("posts"));
    }

    #[test]
    fn test_expire_seconds() {
        let driver = memory_driver();
        let at = chrono::Utc::now() + chrono::Duration::seconds(60);

        assert!((59..=60).contains(&driver.expire_seconds(at)));
        assert_eq!(driver.expire_seconds(0i64), 0);
        assert_eq!(driver.expire_seconds(Duration::from_secs(30)), 30);
    }

    #[tokio::test]
    async fn test_huge_expire_is_accepted() {
        let driver = memory_driver();
        driver
            .set("k", &1, Some(Expire::Seconds(i64::MAX)))
            .await
            .unwrap();

        assert_eq!(driver.get::<i64>("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_numbers_stored_as_literals() {
        let driver = memory_driver();
        driver.set("n", &42, None).await.unwrap();
        driver.set("s", "hi", None).await.unwrap();

        let handler = driver.handler_as::<MemoryHandler>().unwrap();
        assert_eq!(handler.get("app:n").await.unwrap(), Some("42".into()));
        assert_eq!(handler.get("app:s").await.unwrap(), Some("\"hi\"".into()));

        assert_eq!(driver.get::<i64>("n").await.unwrap(), Some(42));
        assert_eq!(driver.get::<String>("s").await.unwrap(), Some("hi".into()));
        assert_eq!(driver.get::<String>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_serializer() {
        let config = StoreConfig::memory().with_serializer(crate::FnSerializer::new(
            |value: &Value| Ok(format!("x{}", value)),
            |payload: &str| {
                serde_json::from_str(payload.trim_start_matches('x'))
                    .map_err(|e| CacheError::Deserialization(e.to_string()))
            },
        ));
        let driver = Driver::new("custom", config, Arc::new(MemoryHandler::new()));

        driver.set("flag", &true, None).await.unwrap();
        driver.set("n", &7, None).await.unwrap();

        let handler = driver.handler_as::<MemoryHandler>().unwrap();
        assert_eq!(handler.get("flag").await.unwrap(), Some("xtrue".into()));
        assert_eq!(handler.get("n").await.unwrap(), Some("7".into()));
        assert_eq!(driver.get::<bool>("flag").await.unwrap(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_and_explicit_expiry() {
        let driver = Driver::new(
            "ttl",
            StoreConfig::memory().with_expire(10),
            Arc::new(MemoryHandler::new()),
        );

        driver.set("default", &1, None).await.unwrap();
        driver.set("forever", &1, Some(Expire::NEVER)).await.unwrap();
        driver
            .set("long", &1, Some(Expire::from(Duration::from_secs(60))))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!driver.has("default").await.unwrap());
        assert!(driver.has("forever").await.unwrap());
        assert!(driver.has("long").await.unwrap());
    }

    #[tokio::test]
    async fn test_past_expiry_removes_entry() {
        let driver = memory_driver();
        driver.set("k", &1, None).await.unwrap();

        let past = chrono::Utc::now() - chrono::Duration::seconds(5);
        assert!(driver.set("k", &2, Some(past.into())).await.unwrap());
        assert!(!driver.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_write_counters() {
        let driver = memory_driver();

        driver.has("a").await.unwrap();
        driver.get_value("a", Value::Null).await.unwrap();
        driver.set("a", &1, None).await.unwrap();
        driver.inc("a", 1).await.unwrap();
        driver.delete("a").await.unwrap();

        assert_eq!(driver.read_times(), 2);
        assert_eq!(driver.write_times(), 3);
    }

    #[tokio::test]
    async fn test_inc_dec() {
        let driver = memory_driver();
        assert_eq!(driver.inc("hits", 3).await.unwrap(), 3);
        assert_eq!(driver.dec("hits", 1).await.unwrap(), 2);
        assert_eq!(driver.get::<i64>("hits").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_pull_deletes_truthy_values() {
        let driver = memory_driver();
        driver.set("token", "abc", None).await.unwrap();

        assert_eq!(driver.pull("token").await.unwrap(), json!("abc"));
        assert!(!driver.has("token").await.unwrap());
        assert_eq!(driver.pull("token").await.unwrap(), json!(false));
    }

    #[tokio::test]
    async fn test_pull_leaves_falsy_values() {
        let driver = memory_driver();
        driver.set("zero", &0, None).await.unwrap();
        driver.set("empty", &Vec::<i32>::new(), None).await.unwrap();
        driver.set("no", &false, None).await.unwrap();

        assert_eq!(driver.pull("zero").await.unwrap(), json!(0));
        assert_eq!(driver.pull("empty").await.unwrap(), json!([]));
        assert_eq!(driver.pull("no").await.unwrap(), json!(false));

        assert!(driver.has("zero").await.unwrap());
        assert!(driver.has("empty").await.unwrap());
        assert!(driver.has("no").await.unwrap());
    }

    #[tokio::test]
    async fn test_push_dedups() {
        let driver = memory_driver();
        driver.push("list", "a").await.unwrap();
        driver.push("list", "b").await.unwrap();
        driver.append("list", "a").await.unwrap();

        assert_eq!(
            driver.get::<Vec<String>>("list").await.unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_push_caps_at_max_len() {
        let driver = memory_driver();
        let full: Vec<usize> = (0..MAX_LIST_LEN).collect();
        driver.set("list", &full, None).await.unwrap();

        driver.push("list", &MAX_LIST_LEN).await.unwrap();

        let list: Vec<usize> = driver.get("list").await.unwrap().unwrap();
        assert_eq!(list.len(), MAX_LIST_LEN);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&MAX_LIST_LEN));
        assert!(!list.contains(&0));
    }

    #[tokio::test]
    async fn test_push_rejects_non_sequence() {
        let driver = memory_driver();
        driver.set("scalar", "text", None).await.unwrap();

        let err = driver.push("scalar", &1).await.unwrap_err();
        assert!(matches!(err, CacheError::Type(_)));
        assert_eq!(driver.get::<String>("scalar").await.unwrap(), Some("text".into()));
    }

    #[tokio::test]
    async fn test_remember_prior_value_wins() {
        let driver = memory_driver();

        assert_eq!(driver.remember("k", 42, None).await.unwrap(), 42);
        assert_eq!(driver.remember("k", 99, None).await.unwrap(), 42);
        assert!(!driver.has("k_lock").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_with_runs_compute_once() {
        let driver = memory_driver();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: String = driver
                .remember_with(
                    "greeting",
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("hello".to_string())
                    },
                    None,
                )
                .await
                .unwrap();
            assert_eq!(value, "hello");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_recomputes_null_hit() {
        let driver = memory_driver();
        driver.set("k", &Value::Null, None).await.unwrap();

        assert_eq!(driver.remember("k", 5, None).await.unwrap(), 5);
        assert_eq!(driver.get::<i64>("k").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_remember_compute_error_releases_lock() {
        let driver = memory_driver();

        let result: CacheResult<i64> = driver
            .remember_with("k", || async { Err(CacheError::Other("boom".into())) }, None)
            .await;

        assert!(matches!(result, Err(CacheError::Other(ref msg)) if msg == "boom"));
        assert!(!driver.has("k_lock").await.unwrap());
        assert!(!driver.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_write_error_releases_lock() {
        let driver = picky_driver();

        let result = driver.remember("broken", 1, None).await;

        assert!(matches!(result, Err(CacheError::Backend(_))));
        assert!(!driver.has("broken_lock").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remember_proceeds_after_lock_wait() {
        let driver = memory_driver();
        driver.set("job_lock", &true, None).await.unwrap();

        let started = Instant::now();
        let value = driver.remember("job", 7, None).await.unwrap();

        assert_eq!(value, 7);
        assert!(started.elapsed() >= LOCK_WAIT);
        assert!(!driver.has("job_lock").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remember_waits_for_lock_release() {
        let driver = memory_driver();
        driver.set("job_lock", &true, None).await.unwrap();

        let started = Instant::now();
        let (value, released) = tokio::join!(driver.remember("job", 7, None), async {
            sleep(Duration::from_millis(500)).await;
            driver.delete("job_lock").await
        });

        assert_eq!(value.unwrap(), 7);
        assert!(released.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_remember_last_write_wins() {
        let driver = memory_driver();
        let slow = |value: i64| async move {
            sleep(Duration::from_millis(100)).await;
            Ok::<_, CacheError>(value)
        };

        let (a, b) = tokio::join!(
            driver.remember_with("report", || slow(1), None),
            driver.remember_with("report", || slow(2), None),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!([1, 2].contains(&a));
        assert!([1, 2].contains(&b));

        let stored: i64 = driver.get("report").await.unwrap().unwrap();
        assert!([1, 2].contains(&stored));
        assert!(!driver.has("report_lock").await.unwrap());
    }

    #[test]
    fn test_tag_sets_are_cached_by_ordered_names() {
        let driver = memory_driver();

        let ab = driver.tag(["a", "b"]);
        let ab_again = driver.tag(vec!["a".to_string(), "b".to_string()]);
        let ba = driver.tag(["b", "a"]);

        assert!(Arc::ptr_eq(&ab, &ab_again));
        assert!(!Arc::ptr_eq(&ab, &ba));
        assert_eq!(ab.names(), ["a", "b"]);
        assert_eq!(ba.names(), ["b", "a"]);
    }

    #[test]
    fn test_tag_single_name_and_duplicates() {
        let driver = memory_driver();

        let single = driver.tag("users");
        assert!(Arc::ptr_eq(&single, &driver.tag(["users", "users"])));
        assert_eq!(single.names(), ["users"]);
    }

    #[tokio::test]
    async fn test_tag_members_default_empty() {
        let driver = memory_driver();
        assert!(driver.tag_members("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_multiple() {
        let driver = memory_driver();
        driver.set("a", &1, None).await.unwrap();

        let values = driver.get_multiple(["a", "b"], json!("none")).await.unwrap();
        assert_eq!(
            values,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!("none"))]
        );
    }

    #[tokio::test]
    async fn test_set_multiple_stops_at_first_refusal() {
        let driver = picky_driver();

        let ok = driver
            .set_multiple([("one", 1), ("refuse", 2), ("three", 3)], None)
            .await
            .unwrap();

        assert!(!ok);
        assert!(driver.has("one").await.unwrap());
        assert!(!driver.has("refuse").await.unwrap());
        assert!(!driver.has("three").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_multiple_propagates_failure() {
        let driver = picky_driver();

        let result = driver
            .set_multiple([("first", 1), ("broken", 2), ("last", 3)], None)
            .await;

        assert!(matches!(result, Err(CacheError::Backend(_))));
        assert!(driver.has("first").await.unwrap());
        assert!(!driver.has("last").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_multiple() {
        let driver = picky_driver();
        driver
            .set_multiple([("a", 1), ("b", 2), ("c", 3)], None)
            .await
            .unwrap();

        assert!(driver.delete_multiple(["a", "b"]).await.unwrap());
        assert!(!driver.has("a").await.unwrap());
        assert!(driver.has("c").await.unwrap());

        // A missing key stops the batch before later keys
        assert!(!driver.delete_multiple(["missing", "c"]).await.unwrap());
        assert!(driver.has("c").await.unwrap());

        assert!(driver.delete_multiple(["c", "broken", "zzz"]).await.is_err());
        assert!(!driver.has("c").await.unwrap());
    }

    #[test]
    fn test_handler_downcast() {
        let driver = memory_driver();
        assert!(driver.handler_as::<MemoryHandler>().is_some());
        assert!(driver.handler_as::<PickyHandler>().is_none());
        assert_eq!(driver.handler().name(), "memory");
    }
}
