//! In-memory store reader
//!
//! Keys enumerate in insertion order. Supports the two live-keyspace
//! hazards the classifier has to tolerate: keys that disappear between
//! enumeration and inspection, and keys whose reads fail outright.

use super::{StoreReader, StoreValue, TypeTag};
use crate::error::StoreError;
use ahash::{AHashMap, AHashSet};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keys: Vec<String>,
    listed: AHashSet<String>,
    values: AHashMap<String, StoreValue>,
    failing: AHashSet<String>,
    reported_count: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key. Replacing keeps the original enumeration slot.
    pub fn insert(&mut self, key: &str, value: StoreValue) {
        self.list(key);
        self.values.insert(key.to_string(), value);
    }

    pub fn with(mut self, key: &str, value: StoreValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Keep `key` in the enumeration but drop its value, as if it expired
    /// after the scan listed it.
    pub fn expire_after_scan(&mut self, key: &str) {
        self.list(key);
        self.values.remove(key);
    }

    /// Make every read of `key` fail with a server error
    pub fn fail_reads(&mut self, key: &str) {
        self.failing.insert(key.to_string());
    }

    /// Override the count returned by `reported_key_count`
    pub fn set_reported_count(&mut self, count: u64) {
        self.reported_count = Some(count);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn list(&mut self, key: &str) {
        if self.listed.insert(key.to_string()) {
            self.keys.push(key.to_string());
        }
    }

    fn check_failure(&self, key: &str) -> Result<(), StoreError> {
        if self.failing.contains(key) {
            return Err(StoreError::Server(format!("ERR injected failure for {}", key)));
        }
        Ok(())
    }
}

impl StoreReader for MemoryStore {
    fn enumerate_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.keys.clone())
    }

    fn type_of(&self, key: &str) -> Result<TypeTag, StoreError> {
        self.check_failure(key)?;
        Ok(self
            .values
            .get(key)
            .map(StoreValue::type_tag)
            .unwrap_or(TypeTag::None))
    }

    fn read(&self, key: &str, tag: &TypeTag) -> Result<StoreValue, StoreError> {
        self.check_failure(key)?;
        match self.values.get(key) {
            Some(value) if value.type_tag() == *tag => Ok(value.clone()),
            Some(value) => Err(StoreError::Server(format!(
                "WRONGTYPE {} holds {}, not {}",
                key,
                value.type_tag().as_str(),
                tag.as_str()
            ))),
            None => Ok(StoreValue::None),
        }
    }

    fn reported_key_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .reported_count
            .unwrap_or_else(|| self.values.len() as u64))
    }
}
