//! Storage module for Cuprous
//!
//! The keyspace engine and the data structures backing it.

pub mod listpack;
pub mod quicklist;
pub mod stream;
pub mod value;
pub mod waiters;
pub mod engine;
pub mod commands;

pub use engine::StorageEngine;
pub use listpack::Listpack;
pub use quicklist::QuickList;
pub use stream::{Stream, StreamEntry, StreamId};
pub use value::{StoredValue, Value, ValueType};

/// Keys are arbitrary byte strings
pub type Key = Vec<u8>;
