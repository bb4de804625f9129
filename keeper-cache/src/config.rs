//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use crate::serializer::Serializer;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable overriding the default store name.
pub const DEFAULT_STORE_ENV: &str = "KEEPER_CACHE_DEFAULT";

fn default_kind() -> String {
    "file".to_string()
}

fn default_tag_prefix() -> String {
    "tag:".to_string()
}

/// Configuration of one named store.
#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend kind (`memory`, `file`, `redis`, or a registered custom kind)
    #[serde(rename = "type", alias = "kind", default = "default_kind")]
    pub kind: String,

    /// Prefix prepended to every cache key
    #[serde(default)]
    pub prefix: String,

    /// Prefix of tag member-list keys
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// TTL in seconds for writes that pass no expiration (0 = permanent)
    #[serde(default)]
    pub expire: u64,

    /// TTL in seconds for `remember` lock entries (0 = no expiry)
    #[serde(default)]
    pub lock_ttl: u64,

    /// Root directory of the file backend
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Connection URL of networked backends
    #[serde(default)]
    pub url: Option<String>,

    /// Backend-specific parameters for custom factories
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    /// Encoder for non-numeric values; JSON when unset
    #[serde(skip)]
    pub serializer: Option<Arc<dyn Serializer>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            prefix: String::new(),
            tag_prefix: default_tag_prefix(),
            expire: 0,
            lock_ttl: 0,
            path: None,
            url: None,
            options: HashMap::new(),
            serializer: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("kind", &self.kind)
            .field("prefix", &self.prefix)
            .field("tag_prefix", &self.tag_prefix)
            .field("expire", &self.expire)
            .field("lock_ttl", &self.lock_ttl)
            .field("path", &self.path)
            .field("url", &self.url)
            .field("options", &self.options)
            .field("serializer", &self.serializer.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl StoreConfig {
    /// Create a store configuration for the given backend kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// In-memory store.
    pub fn memory() -> Self {
        Self::new("memory")
    }

    /// File store rooted at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new("file")
        }
    }

    /// Redis store.
    ///
    /// # Examples
    ///
    /// ```
    /// use keeper_cache::StoreConfig;
    ///
    /// let config = StoreConfig::redis("redis://localhost:6379").with_prefix("app:");
    /// assert_eq!(config.kind, "redis");
    /// ```
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new("redis")
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the tag member-list key prefix.
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Set the default TTL in seconds.
    pub fn with_expire(mut self, seconds: u64) -> Self {
        self.expire = seconds;
        self
    }

    /// Give `remember` lock entries a TTL in seconds.
    pub fn with_lock_ttl(mut self, seconds: u64) -> Self {
        self.lock_ttl = seconds;
        self
    }

    /// Set a backend-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Replace the serializer used for non-numeric values.
    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }
}

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

/// Configuration of every named store plus the default store name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Store used when no name is given
    #[serde(default)]
    pub default: Option<String>,

    /// Stores by name
    #[serde(default)]
    pub stores: HashMap<String, StoreConfig>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    ///
    /// ```
    /// use keeper_cache::CacheConfig;
    ///
    /// let config = CacheConfig::from_toml_str(r#"
    ///     default = "local"
    ///
    ///     [stores.local]
    ///     type = "memory"
    ///     prefix = "app:"
    /// "#).unwrap();
    ///
    /// assert_eq!(config.store("local").unwrap().prefix, "app:");
    /// ```
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        toml::from_str(source).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Parse a JSON document.
    pub fn from_json_str(source: &str) -> CacheResult<Self> {
        serde_json::from_str(source).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Load a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path).ok_or_else(|| {
            CacheError::Config(format!("Unsupported config file: {}", path.display()))
        })?;
        let source = std::fs::read_to_string(path)?;

        match format {
            FileFormat::Json => Self::from_json_str(&source),
            FileFormat::Toml => Self::from_toml_str(&source),
        }
    }

    /// Apply `KEEPER_CACHE_DEFAULT`, if set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var(DEFAULT_STORE_ENV)
            && !name.is_empty()
        {
            self.default = Some(name);
        }
        self
    }

    /// Set the default store name.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    /// Add or replace a named store.
    pub fn with_store(mut self, name: impl Into<String>, store: StoreConfig) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Look up a store's configuration.
    pub fn store(&self, name: &str) -> CacheResult<&StoreConfig> {
        self.stores
            .get(name)
            .ok_or_else(|| CacheError::Config(format!("Store [{}] not found.", name)))
    }
}
