//! Storage cost estimation
//!
//! Estimates are deliberately rough: the payload bytes plus a flat
//! [`ENTRY_OVERHEAD`] per collection element. They rank keys and groups by
//! footprint; they are not the allocator-level byte counts `MEMORY USAGE`
//! would report.
//!
//! | type   | estimate                                        |
//! |--------|-------------------------------------------------|
//! | none   | 0                                               |
//! | string | byte length                                     |
//! | list   | Σ (1 + element length)                          |
//! | set    | Σ (1 + member length)                           |
//! | zset   | Σ (1 + member length)                           |
//! | hash   | Σ (1 + length) over every field name and value  |
//! | other  | 0                                               |

use crate::error::StoreError;
use crate::store::{StoreReader, StoreValue, TypeTag};
use tracing::debug;

/// Per-element overhead added for every collection entry
pub const ENTRY_OVERHEAD: u64 = 1;

#[inline]
fn entry_cost(bytes: &[u8]) -> u64 {
    ENTRY_OVERHEAD + bytes.len() as u64
}

/// Estimate the cost of an already-read value
pub fn estimate(value: &StoreValue) -> u64 {
    match value {
        StoreValue::None => 0,
        StoreValue::String(data) => data.len() as u64,
        StoreValue::List(items) | StoreValue::Set(items) | StoreValue::SortedSet(items) => {
            items.iter().map(|item| entry_cost(item)).sum()
        }
        StoreValue::Hash(pairs) => pairs
            .iter()
            .map(|(field, value)| entry_cost(field) + entry_cost(value))
            .sum(),
        StoreValue::Unknown(_) => 0,
    }
}

/// Look up `key`'s type, read it, and estimate its cost
pub fn estimate_key<S: StoreReader + ?Sized>(store: &S, key: &str) -> Result<u64, StoreError> {
    let tag = store.type_of(key)?;
    match tag {
        TypeTag::None => Ok(0),
        TypeTag::Unknown(ref name) => {
            debug!(key, type_name = %name, "Unsized value type, counting as zero");
            Ok(0)
        }
        _ => {
            let value = store.read(key, &tag)?;
            Ok(estimate(&value))
        }
    }
}
