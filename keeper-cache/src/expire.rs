//! Expiration specifications.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// When a cache entry should expire.
///
/// Every form resolves to a TTL in whole seconds relative to now, where `0`
/// means the entry never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expire {
    /// Raw number of seconds; `0` is permanent.
    Seconds(i64),
    /// Relative duration from now.
    After(Duration),
    /// Absolute point in time.
    At(DateTime<Utc>),
}

impl Expire {
    /// Never expire.
    pub const NEVER: Expire = Expire::Seconds(0);

    /// Relative TTL in seconds. Instants in the past yield a negative value.
    pub fn seconds(&self) -> i64 {
        match self {
            Expire::Seconds(secs) => *secs,
            Expire::After(duration) => i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            Expire::At(at) => at.timestamp() - Utc::now().timestamp(),
        }
    }
}

impl From<i64> for Expire {
    fn from(secs: i64) -> Self {
        Expire::Seconds(secs)
    }
}

impl From<u64> for Expire {
    fn from(secs: u64) -> Self {
        Expire::Seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

impl From<i32> for Expire {
    fn from(secs: i32) -> Self {
        Expire::Seconds(secs.into())
    }
}

impl From<u32> for Expire {
    fn from(secs: u32) -> Self {
        Expire::Seconds(secs.into())
    }
}

impl From<Duration> for Expire {
    fn from(duration: Duration) -> Self {
        Expire::After(duration)
    }
}

impl From<DateTime<Utc>> for Expire {
    fn from(at: DateTime<Utc>) -> Self {
        Expire::At(at)
    }
}
