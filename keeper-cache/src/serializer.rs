//! Value encoding for backend payloads.
//!
//! Numbers are written as their literal text and read back without going
//! through the configured [`Serializer`]; every other value is encoded by it.

use crate::error::{CacheError, CacheResult};
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// Pluggable encode/decode pair for non-numeric values.
pub trait Serializer: Send + Sync {
    /// Encode a value into a backend payload.
    fn serialize(&self, value: &Value) -> CacheResult<String>;

    /// Decode a backend payload.
    fn deserialize(&self, payload: &str) -> CacheResult<Value>;
}

/// JSON encoding, used when a store configures no serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> CacheResult<String> {
        serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize(&self, payload: &str) -> CacheResult<Value> {
        serde_json::from_str(payload).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

type EncodeFn = dyn Fn(&Value) -> CacheResult<String> + Send + Sync;
type DecodeFn = dyn Fn(&str) -> CacheResult<Value> + Send + Sync;

/// Serializer built from a pair of closures.
///
/// ```
/// use keeper_cache::{FnSerializer, Value};
///
/// let upper = FnSerializer::new(
///     |value: &Value| Ok(value.to_string().to_uppercase()),
///     |payload: &str| Ok(Value::String(payload.to_lowercase())),
/// );
/// # let _ = upper;
/// ```
#[derive(Clone)]
pub struct FnSerializer {
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
}

impl FnSerializer {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&Value) -> CacheResult<String> + Send + Sync + 'static,
        D: Fn(&str) -> CacheResult<Value> + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }
}

impl fmt::Debug for FnSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSerializer").finish_non_exhaustive()
    }
}

impl Serializer for FnSerializer {
    fn serialize(&self, value: &Value) -> CacheResult<String> {
        (self.encode)(value)
    }

    fn deserialize(&self, payload: &str) -> CacheResult<Value> {
        (self.decode)(payload)
    }
}

/// Encode a value, writing numbers as bare literals.
pub(crate) fn encode(serializer: &dyn Serializer, value: &Value) -> CacheResult<String> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        other => serializer.serialize(other),
    }
}

/// Decode a payload, short-circuiting numeric literals.
pub(crate) fn decode(serializer: &dyn Serializer, payload: &str) -> CacheResult<Value> {
    match parse_numeric(payload) {
        Some(n) => Ok(Value::Number(n)),
        None => serializer.deserialize(payload),
    }
}

/// Parse a payload that is entirely a finite numeric literal.
pub(crate) fn parse_numeric(payload: &str) -> Option<Number> {
    let first = payload.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }

    if let Ok(i) = payload.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = payload.parse::<u64>() {
        return Some(Number::from(u));
    }
    payload
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}
