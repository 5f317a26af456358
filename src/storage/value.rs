//! Value types for the storage engine
//!
//! A key holds exactly one kind of value for its lifetime; kind-changing
//! writes fail with a wrong-type error instead of overwriting.

use std::time::Instant;
use super::quicklist::QuickList;
use super::stream::Stream;

/// All value kinds a key can hold
#[derive(Debug, Clone)]
pub enum Value {
    /// String value (bytes)
    String(Vec<u8>),

    /// List value backed by a quicklist
    List(QuickList),

    /// Stream value
    Stream(Stream),
}

/// Value kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    List,
    Stream,
}

impl ValueType {
    /// Kind name as reported by TYPE
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Stream => "stream",
        }
    }
}

impl Value {
    /// Get the kind of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Stream(_) => ValueType::Stream,
        }
    }

    /// Create a string value from bytes
    pub fn string<T: Into<Vec<u8>>>(data: T) -> Self {
        Value::String(data.into())
    }

    /// Create an integer string value
    pub fn integer(n: i64) -> Self {
        Value::String(n.to_string().into_bytes())
    }

    /// Try to parse a string value as a signed decimal integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::String(bytes) => std::str::from_utf8(bytes).ok()?.parse::<i64>().ok(),
            _ => None,
        }
    }
}

/// A stored entry with lifecycle metadata
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// The actual value
    pub value: Value,

    /// When the value expires, if ever. Only string entries carry deadlines.
    pub expires_at: Option<Instant>,

    /// Identity stamp, renewed on every insert/replace. Expiry reaping
    /// re-checks it under the exclusive lock so a racing SET is not
    /// clobbered.
    pub version: u64,
}

impl StoredValue {
    pub fn new(value: Value, version: u64) -> Self {
        StoredValue {
            value,
            expires_at: None,
            version,
        }
    }

    pub fn with_expiration(value: Value, expires_at: Instant, version: u64) -> Self {
        StoredValue {
            value,
            expires_at: Some(expires_at),
            version,
        }
    }

    /// Check whether this entry's deadline has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}
