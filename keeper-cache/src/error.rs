//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Store name, default store, or backend kind could not be resolved
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation applied to a value of the wrong shape
    #[error("Type error: {0}")]
    Type(String),

    /// Failure reported by a backend handler
    #[error("Backend error: {0}")]
    Backend(String),

    /// Filesystem failure (file backend)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A memoized computation failed; the lock was released before this
    /// error was raised.
    #[error("Failed to remember '{key}': {source}")]
    Remember {
        key: String,
        #[source]
        source: Box<CacheError>,
    },

    /// A tag set was used after its driver was dropped
    #[error("Driver for this tag set has been dropped")]
    DriverDropped,

    /// Generic error
    #[error("Cache error: {0}")]
    Other(String),
}

impl CacheError {
    /// Wrap a failure raised while remembering `key`.
    pub fn remember(key: impl Into<String>, source: CacheError) -> Self {
        CacheError::Remember {
            key: key.into(),
            source: Box::new(source),
        }
    }
}
