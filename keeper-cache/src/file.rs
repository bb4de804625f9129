//! File backend: one file per key.
//!
//! Entry layout on disk: `<root>/<h[0..2]>/<h[2..]>.cache` where `h` is the
//! hex SHA-256 of the key. A file holds a 12-digit absolute expiry (unix
//! seconds, `0` for permanent) immediately followed by the payload.

use crate::error::{CacheError, CacheResult};
use crate::handler::CacheHandler;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;

const EXPIRY_WIDTH: usize = 12;
/// Latest expiry the header can hold.
const MAX_EXPIRY: i64 = 999_999_999_999;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem handler.
#[derive(Debug, Clone)]
pub struct FileHandler {
    root: PathBuf,
}

impl FileHandler {
    /// Create a handler rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root under the system temp directory.
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("keeper-cache")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join(&hash[..2])
            .join(format!("{}.cache", &hash[2..]))
    }

    /// Read an entry, deleting it when expired.
    async fn read_entry(&self, key: &str) -> CacheResult<Option<(i64, String)>> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (header, payload) = match content.get(..EXPIRY_WIDTH) {
            Some(header) => (header, &content[EXPIRY_WIDTH..]),
            None => return Err(corrupt(&path)),
        };
        let expires_at: i64 = header.parse().map_err(|_| corrupt(&path))?;

        if expires_at != 0 && chrono::Utc::now().timestamp() >= expires_at {
            remove_file(&path).await?;
            return Ok(None);
        }
        Ok(Some((expires_at, payload.to_string())))
    }

    async fn write_entry(&self, key: &str, expires_at: i64, value: &str) -> CacheResult<()> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let tmp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let expires_at = expires_at.clamp(0, MAX_EXPIRY);
        fs::write(&tmp, format!("{:0width$}{}", expires_at, value, width = EXPIRY_WIDTH))
            .await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

fn corrupt(path: &Path) -> CacheError {
    CacheError::Backend(format!("corrupt cache file {}", path.display()))
}

async fn remove_file(path: &Path) -> CacheResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheHandler for FileHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.read_entry(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.read_entry(key).await?.map(|(_, payload)| payload))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        let expires_at = match ttl {
            Some(ttl) => {
                let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
                chrono::Utc::now().timestamp().saturating_add(secs.max(1))
            }
            None => 0,
        };
        self.write_entry(key, expires_at, &value).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        remove_file(&self.entry_path(key)).await
    }

    async fn clear(&self) -> CacheResult<bool> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn inc(&self, key: &str, step: i64) -> CacheResult<i64> {
        let (expires_at, current) = match self.read_entry(key).await? {
            Some((expires_at, payload)) => {
                let current = payload.parse::<i64>().map_err(|_| {
                    CacheError::Type(format!("cannot increment non-numeric entry '{}'", key))
                })?;
                (expires_at, current)
            }
            None => (0, 0),
        };

        let next = current.checked_add(step).ok_or_else(|| {
            CacheError::Type(format!("increment of '{}' overflows", key))
        })?;
        self.write_entry(key, expires_at, &next.to_string()).await?;
        Ok(next)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
