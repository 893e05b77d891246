//! Store reader interface
//!
//! The analysis core only ever reads from the store through [`StoreReader`]:
//! - `RespStore`: live Redis (or compatible) server over RESP2
//! - `MemoryStore`: in-process keyspace for tests and demos

mod client;
mod memory;
mod resp;

pub use client::{RespStore, RespStoreConfig};
pub use memory::MemoryStore;
pub use resp::{FrameScanner, RespError, RespParser, RespValue};

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Value type as reported by the store's `TYPE` command
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Key does not exist (expired or deleted since enumeration)
    None,
    String,
    List,
    Set,
    SortedSet,
    Hash,
    /// A type this crate does not know how to size (stream, module types, ...)
    Unknown(String),
}

impl TypeTag {
    /// Parse the reply of `TYPE`
    pub fn parse(reply: &str) -> Self {
        match reply {
            "none" => TypeTag::None,
            "string" => TypeTag::String,
            "list" => TypeTag::List,
            "set" => TypeTag::Set,
            "zset" => TypeTag::SortedSet,
            "hash" => TypeTag::Hash,
            other => TypeTag::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::None => "none",
            TypeTag::String => "string",
            TypeTag::List => "list",
            TypeTag::Set => "set",
            TypeTag::SortedSet => "zset",
            TypeTag::Hash => "hash",
            TypeTag::Unknown(name) => name,
        }
    }
}

/// Raw contents of one key, shaped by its type
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    None,
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    /// Members only, in rank order; scores are not part of the estimate
    SortedSet(Vec<Vec<u8>>),
    /// Field/value pairs
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    Unknown(String),
}

impl StoreValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            StoreValue::None => TypeTag::None,
            StoreValue::String(_) => TypeTag::String,
            StoreValue::List(_) => TypeTag::List,
            StoreValue::Set(_) => TypeTag::Set,
            StoreValue::SortedSet(_) => TypeTag::SortedSet,
            StoreValue::Hash(_) => TypeTag::Hash,
            StoreValue::Unknown(name) => TypeTag::Unknown(name.clone()),
        }
    }

    /// Convenience constructor for string values
    pub fn string(value: &str) -> Self {
        StoreValue::String(value.as_bytes().to_vec())
    }

    pub fn list(items: &[&str]) -> Self {
        StoreValue::List(to_bytes(items))
    }

    pub fn set(members: &[&str]) -> Self {
        StoreValue::Set(to_bytes(members))
    }

    pub fn sorted_set(members: &[&str]) -> Self {
        StoreValue::SortedSet(to_bytes(members))
    }

    pub fn hash(pairs: &[(&str, &str)]) -> Self {
        StoreValue::Hash(
            pairs
                .iter()
                .map(|(f, v)| (f.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect(),
        )
    }
}

fn to_bytes(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

/// Read-only view of a key-value store
///
/// Every method is a point-in-time read; a key enumerated by
/// `enumerate_keys` may be gone by the time `type_of` is called.
pub trait StoreReader {
    /// All keys currently in the store
    fn enumerate_keys(&self) -> Result<Vec<String>, StoreError>;

    /// The store-reported type of `key`
    fn type_of(&self, key: &str) -> Result<TypeTag, StoreError>;

    /// Read the full contents of `key`, interpreted as `tag`
    fn read(&self, key: &str, tag: &TypeTag) -> Result<StoreValue, StoreError>;

    /// The store's own count of keys in the analysed database
    fn reported_key_count(&self) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_parse() {
        assert_eq!(TypeTag::parse("none"), TypeTag::None);
        assert_eq!(TypeTag::parse("string"), TypeTag::String);
        assert_eq!(TypeTag::parse("zset"), TypeTag::SortedSet);
        assert_eq!(
            TypeTag::parse("stream"),
            TypeTag::Unknown("stream".to_string())
        );
    }

    #[test]
    fn test_type_tag_as_str_matches_parse() {
        for name in ["none", "string", "list", "set", "zset", "hash", "stream"] {
            assert_eq!(TypeTag::parse(name).as_str(), name);
        }
    }

    #[test]
    fn test_value_type_tag() {
        assert_eq!(StoreValue::string("x").type_tag(), TypeTag::String);
        assert_eq!(StoreValue::sorted_set(&["a"]).type_tag(), TypeTag::SortedSet);
        assert_eq!(StoreValue::hash(&[("f", "v")]).type_tag(), TypeTag::Hash);
    }
}
