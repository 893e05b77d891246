//! Keyspace classification
//!
//! Walks every enumerated key, assigns it to the group of the first matching
//! template (or `unregistered`), and optionally estimates its size.
//!
//! Per-key failures are isolated: a key whose type or contents cannot be
//! read counts as zero bytes and the scan continues.
//!
//! With more than one worker, keys are cut into disjoint batches that
//! workers claim from a shared queue. Each worker fills its own partial
//! [`Classification`]; partials are merged once all workers finish. Group
//! membership order is then arrival order and is not deterministic; counts,
//! sizes and the per-key size index are the same as a sequential run.

use super::registry::{GroupId, Registry};
use super::size::estimate_key;
use crate::error::StoreError;
use crate::store::StoreReader;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Keys assigned to one group and their summed size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroup {
    /// Raw keys in scan (or arrival) order
    pub keys: Vec<String>,
    /// Sum of the estimated sizes of `keys`
    pub size: u64,
}

impl KeyGroup {
    pub fn count(&self) -> u64 {
        self.keys.len() as u64
    }
}

/// Output of one classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub groups: BTreeMap<GroupId, KeyGroup>,
    /// Estimated size per raw key; empty when sizes were not estimated
    pub key_sizes: AHashMap<String, u64>,
    /// Keys processed, whatever their outcome
    pub processed: u64,
    /// Keys whose size lookup failed and were counted as zero
    pub size_failures: u64,
    pub sizes_estimated: bool,
}

impl Classification {
    pub fn new(sizes_estimated: bool) -> Self {
        Classification {
            sizes_estimated,
            ..Default::default()
        }
    }

    /// Record one key. `size` is `None` when sizes are not being estimated.
    pub fn record(&mut self, group: GroupId, key: &str, size: Option<u64>) {
        let entry = self.groups.entry(group).or_default();
        entry.keys.push(key.to_string());
        if let Some(size) = size {
            entry.size = entry.size.saturating_add(size);
            let slot = self.key_sizes.entry(key.to_string()).or_insert(0);
            *slot = slot.saturating_add(size);
        }
        self.processed += 1;
    }

    /// Fold a partial classification into this one
    pub fn merge(&mut self, other: Classification) {
        for (group, partial) in other.groups {
            let entry = self.groups.entry(group).or_default();
            entry.keys.extend(partial.keys);
            entry.size = entry.size.saturating_add(partial.size);
        }
        for (key, size) in other.key_sizes {
            let slot = self.key_sizes.entry(key).or_insert(0);
            *slot = slot.saturating_add(size);
        }
        self.processed += other.processed;
        self.size_failures += other.size_failures;
    }

    pub fn group(&self, group: &GroupId) -> Option<&KeyGroup> {
        self.groups.get(group)
    }

    pub fn unregistered(&self) -> Option<&KeyGroup> {
        self.groups.get(&GroupId::Unregistered)
    }

    pub fn key_size(&self, key: &str) -> u64 {
        self.key_sizes.get(key).copied().unwrap_or(0)
    }

    pub fn total_size(&self) -> u64 {
        self.groups.values().map(|g| g.size).sum()
    }

    /// Verify all invariants hold for this classification
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        // Invariant 1: every processed key landed in exactly one group
        let members: u64 = self.groups.values().map(KeyGroup::count).sum();
        debug_assert_eq!(
            members, self.processed,
            "Invariant violated: group members {} != processed {}",
            members, self.processed
        );

        // Invariant 2: no group exists without members
        debug_assert!(
            self.groups.values().all(|g| !g.keys.is_empty()),
            "Invariant violated: empty group present"
        );

        // Invariant 3: size tallies agree with the per-key index
        if self.sizes_estimated {
            let indexed: u64 = self.key_sizes.values().sum();
            debug_assert_eq!(
                indexed,
                self.total_size(),
                "Invariant violated: key index total != group total"
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}
}

/// Knobs for a classification pass
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub estimate_sizes: bool,
    /// Worker threads; 1 runs on the calling thread
    pub workers: usize,
    /// Keys per batch claimed by a worker
    pub batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            estimate_sizes: true,
            workers: 1,
            batch_size: 1000,
        }
    }
}

/// Classifies keys against a registry
pub struct KeyspaceClassifier<'r> {
    registry: &'r Registry,
    config: ClassifierConfig,
}

impl<'r> KeyspaceClassifier<'r> {
    pub fn new(registry: &'r Registry, config: ClassifierConfig) -> Self {
        KeyspaceClassifier { registry, config }
    }

    /// Enumerate the store and classify every key
    pub fn run<S: StoreReader + Sync + ?Sized>(&self, store: &S) -> Result<Classification, StoreError> {
        let keys = store.enumerate_keys()?;
        Ok(self.classify_keys(store, &keys))
    }

    /// Classify an already-enumerated key list
    pub fn classify_keys<S: StoreReader + Sync + ?Sized>(
        &self,
        store: &S,
        keys: &[String],
    ) -> Classification {
        let started = Instant::now();
        let workers = self.config.workers.max(1);

        let classification = if workers == 1 || keys.len() <= self.config.batch_size.max(1) {
            let mut result = Classification::new(self.config.estimate_sizes);
            for key in keys {
                self.classify_one(store, key, &mut result);
            }
            result
        } else {
            self.classify_parallel(store, keys, workers)
        };

        classification.verify_invariants();
        info!(
            keys = classification.processed,
            groups = classification.groups.len(),
            size_failures = classification.size_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Classified keyspace"
        );
        classification
    }

    fn classify_parallel<S: StoreReader + Sync + ?Sized>(
        &self,
        store: &S,
        keys: &[String],
        workers: usize,
    ) -> Classification {
        let (tx, rx) = crossbeam::channel::unbounded::<&[String]>();
        for batch in keys.chunks(self.config.batch_size.max(1)) {
            // receiver is alive in this scope, send cannot fail
            let _ = tx.send(batch);
        }
        drop(tx);

        let partials = crossbeam::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let rx = rx.clone();
                    scope.spawn(move |_| {
                        let mut partial = Classification::new(self.config.estimate_sizes);
                        let mut batches = 0usize;
                        for batch in rx.iter() {
                            for key in batch {
                                self.classify_one(store, key, &mut partial);
                            }
                            batches += 1;
                        }
                        debug!(worker, batches, keys = partial.processed, "Worker finished");
                        partial
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|e| std::panic::resume_unwind(e));

        let mut merged = Classification::new(self.config.estimate_sizes);
        for partial in partials {
            merged.merge(partial);
        }
        merged
    }

    fn classify_one<S: StoreReader + ?Sized>(&self, store: &S, key: &str, into: &mut Classification) {
        let group = match self.registry.classify(key) {
            Some((group, matcher)) => {
                debug!(key, template = %matcher.template(), "matched");
                group
            }
            None => {
                debug!(key, "unmatched");
                GroupId::Unregistered
            }
        };

        let size = if self.config.estimate_sizes {
            match estimate_key(store, key) {
                Ok(size) => Some(size),
                Err(e) => {
                    warn!(key, error = %e, "Size lookup failed, counting as zero");
                    into.size_failures += 1;
                    Some(0)
                }
            }
        } else {
            None
        };

        into.record(group, key, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreValue};
    use crate::templates::{KeyTemplate, TemplateSet};

    fn orders_registry() -> Registry {
        Registry::build(TemplateSet::new(
            &["orders:ACCOUNT_ID", "orders:ACCOUNT_ID:status"],
            Some("ACCOUNT_ID"),
        ))
    }

    fn registered(template: &str) -> GroupId {
        GroupId::Registered(KeyTemplate::new(template))
    }

    fn orders_store() -> MemoryStore {
        MemoryStore::new()
            .with("orders:42", StoreValue::string("abcd"))
            .with("orders:42:status", StoreValue::string("paid"))
            .with("orders:other", StoreValue::list(&["x", "y"]))
            .with("carts:9", StoreValue::set(&["sku"]))
    }

    #[test]
    fn test_classify_orders_scenario() {
        let registry = orders_registry();
        let classifier = KeyspaceClassifier::new(&registry, ClassifierConfig::default());
        let result = classifier.run(&orders_store()).unwrap();

        let base = result.group(&registered("orders:ACCOUNT_ID")).unwrap();
        assert_eq!(base.keys, vec!["orders:42", "orders:other"]);
        assert_eq!(base.size, 4 + 4);

        let status = result.group(&registered("orders:ACCOUNT_ID:status")).unwrap();
        assert_eq!(status.keys, vec!["orders:42:status"]);

        let stray = result.unregistered().unwrap();
        assert_eq!(stray.keys, vec!["carts:9"]);
        assert_eq!(stray.size, 4);

        assert_eq!(result.processed, 4);
        assert_eq!(result.key_size("orders:other"), 4);
    }

    #[test]
    fn test_without_size_estimation() {
        let registry = orders_registry();
        let config = ClassifierConfig {
            estimate_sizes: false,
            ..Default::default()
        };
        let result = KeyspaceClassifier::new(&registry, config)
            .run(&orders_store())
            .unwrap();

        assert!(!result.sizes_estimated);
        assert!(result.key_sizes.is_empty());
        assert_eq!(result.total_size(), 0);
        assert_eq!(result.processed, 4);
    }

    #[test]
    fn test_failed_lookup_counts_zero_and_continues() {
        let registry = orders_registry();
        let mut store = orders_store();
        store.fail_reads("orders:42");
        store.expire_after_scan("orders:other");

        let result = KeyspaceClassifier::new(&registry, ClassifierConfig::default())
            .run(&store)
            .unwrap();

        assert_eq!(result.processed, 4);
        assert_eq!(result.size_failures, 1);
        assert_eq!(result.key_size("orders:42"), 0);
        assert_eq!(result.key_size("orders:other"), 0);
        let base = result.group(&registered("orders:ACCOUNT_ID")).unwrap();
        assert_eq!(base.count(), 2);
        assert_eq!(base.size, 0);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let registry = orders_registry();
        let classifier = KeyspaceClassifier::new(&registry, ClassifierConfig::default());
        let store = orders_store();
        assert_eq!(classifier.run(&store).unwrap(), classifier.run(&store).unwrap());
    }

    #[test]
    fn test_parallel_matches_sequential_totals() {
        let registry = orders_registry();
        let mut store = MemoryStore::new();
        for i in 0..500 {
            store.insert(&format!("orders:{}", i), StoreValue::string("v"));
            store.insert(&format!("orders:{}:status", i), StoreValue::list(&["a", "bc"]));
            store.insert(&format!("misc:{}:x:y", i), StoreValue::string("zz"));
        }

        let sequential = KeyspaceClassifier::new(&registry, ClassifierConfig::default())
            .run(&store)
            .unwrap();
        let parallel = KeyspaceClassifier::new(
            &registry,
            ClassifierConfig {
                estimate_sizes: true,
                workers: 4,
                batch_size: 37,
            },
        )
        .run(&store)
        .unwrap();

        assert_eq!(parallel.processed, sequential.processed);
        assert_eq!(parallel.key_sizes, sequential.key_sizes);
        for (group, expected) in &sequential.groups {
            let actual = parallel.group(group).unwrap();
            assert_eq!(actual.size, expected.size);
            let mut a = actual.keys.clone();
            let mut e = expected.keys.clone();
            a.sort();
            e.sort();
            assert_eq!(a, e);
        }
    }

    #[test]
    fn test_empty_keyspace() {
        let registry = orders_registry();
        let result = KeyspaceClassifier::new(&registry, ClassifierConfig::default())
            .run(&MemoryStore::new())
            .unwrap();
        assert_eq!(result.processed, 0);
        assert!(result.groups.is_empty());
    }

    #[test]
    fn test_merge_sums_partials() {
        let mut a = Classification::new(true);
        a.record(GroupId::Unregistered, "x", Some(3));
        let mut b = Classification::new(true);
        b.record(GroupId::Unregistered, "y", Some(4));
        b.size_failures = 1;

        a.merge(b);
        let group = a.unregistered().unwrap();
        assert_eq!(group.keys, vec!["x", "y"]);
        assert_eq!(group.size, 7);
        assert_eq!(a.processed, 2);
        assert_eq!(a.size_failures, 1);
    }
}
