//! Deterministic Simulation Testing for keyspace classification
//!
//! Seeded harness that grows a keyspace one random key at a time, injects
//! the live-store hazards (keys expiring after enumeration, reads failing),
//! and periodically classifies the whole keyspace twice: once on the calling
//! thread and once with a worker pool. Checks after every pass:
//! - both passes agree on counts, sizes and group membership
//! - every key's size equals the model's expectation
//! - partition buckets sum to their group's count and size
//! - every registered member re-classifies to its own group

use super::classifier::{Classification, ClassifierConfig, KeyspaceClassifier};
use super::partition::partition_group;
use super::registry::{GroupId, Registry};
use super::size::estimate;
use crate::store::{MemoryStore, StoreValue};
use crate::templates::TemplateSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};

const TEMPLATES: [&str; 5] = [
    "orders:ACCOUNT_ID",
    "orders:ACCOUNT_ID:status",
    "items:ACCOUNT_ID:ITEM_ID",
    "session:SESSION_ID",
    "resque:QUEUE_NAME",
];

/// Configuration for classifier DST
#[derive(Debug, Clone)]
pub struct ClassifierDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Distinct partition values to draw from
    pub num_accounts: usize,
    /// Probability that a generated key matches no template
    pub stray_prob: f64,
    /// Probability of injecting a fault on an existing key instead of inserting
    pub fault_prob: f64,
    /// Worker threads for the parallel pass
    pub workers: usize,
    /// Batch size for the parallel pass
    pub batch_size: usize,
    /// Operations between classification passes
    pub check_every: usize,
}

impl Default for ClassifierDSTConfig {
    fn default() -> Self {
        ClassifierDSTConfig {
            seed: 0,
            num_accounts: 20,
            stray_prob: 0.2,
            fault_prob: 0.05,
            workers: 4,
            batch_size: 16,
            check_every: 50,
        }
    }
}

impl ClassifierDSTConfig {
    pub fn new(seed: u64) -> Self {
        ClassifierDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few partition values, so buckets get large
    pub fn few_accounts(seed: u64) -> Self {
        ClassifierDSTConfig {
            seed,
            num_accounts: 3,
            ..Default::default()
        }
    }

    /// Many expired and failing keys
    pub fn hostile_store(seed: u64) -> Self {
        ClassifierDSTConfig {
            seed,
            fault_prob: 0.3,
            stray_prob: 0.4,
            workers: 3,
            batch_size: 5,
            ..Default::default()
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum ClassifierOp {
    Insert { key: String },
    Expire { key: String },
    FailReads { key: String },
}

/// Result of a classifier DST run
#[derive(Debug, Clone)]
pub struct ClassifierDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub inserts: u64,
    pub expires: u64,
    pub failures_injected: u64,
    pub passes: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<ClassifierOp>,
}

impl ClassifierDSTResult {
    pub fn new(seed: u64) -> Self {
        ClassifierDSTResult {
            seed,
            total_operations: 0,
            inserts: 0,
            expires: 0,
            failures_injected: 0,
            passes: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (inserts:{}, expires:{}, failures:{}), {} passes, {} violations",
            self.seed,
            self.total_operations,
            self.inserts,
            self.expires,
            self.failures_injected,
            self.passes,
            self.invariant_violations.len()
        )
    }
}

/// DST harness for KeyspaceClassifier
pub struct ClassifierDSTHarness {
    config: ClassifierDSTConfig,
    rng: ChaCha8Rng,
    registry: Registry,
    store: MemoryStore,
    result: ClassifierDSTResult,
    /// Expected size per enumerated key
    expected_sizes: HashMap<String, u64>,
    /// Enumerated keys in insertion order
    keys: Vec<String>,
    expired: HashSet<String>,
    failing: HashSet<String>,
}

impl ClassifierDSTHarness {
    pub fn new(config: ClassifierDSTConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        ClassifierDSTHarness {
            result: ClassifierDSTResult::new(config.seed),
            registry: Registry::build(TemplateSet::new(&TEMPLATES, Some("ACCOUNT_ID"))),
            config,
            rng,
            store: MemoryStore::new(),
            expected_sizes: HashMap::new(),
            keys: Vec::new(),
            expired: HashSet::new(),
            failing: HashSet::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(ClassifierDSTConfig::new(seed))
    }

    fn random_token(&mut self, prefix: &str, range: usize) -> String {
        format!("{}{}", prefix, self.rng.gen_range(0..range.max(1)))
    }

    fn random_key(&mut self) -> String {
        if self.rng.gen_bool(self.config.stray_prob) {
            let n = self.rng.gen_range(0..50);
            return match self.rng.gen_range(0..4) {
                0 => format!("lock:orders:{}", n),
                1 => format!("cache:{}:fragment:html", n),
                2 => "orders".to_string(),
                _ => format!("orders:{}:status:old", n),
            };
        }

        let account = self.random_token("acct", self.config.num_accounts);
        match self.rng.gen_range(0..TEMPLATES.len()) {
            0 => format!("orders:{}", account),
            1 => format!("orders:{}:status", account),
            2 => {
                let item = self.random_token("item", 30);
                format!("items:{}:{}", account, item)
            }
            3 => self.random_token("session:s", 100),
            _ => self.random_token("resque:queue", 5),
        }
    }

    fn random_value(&mut self) -> StoreValue {
        let len = self.rng.gen_range(0..6);
        let items: Vec<String> = (0..len)
            .map(|i| format!("{}{}", i, "x".repeat(self.rng.gen_range(0..8))))
            .collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        match self.rng.gen_range(0..5) {
            0 => StoreValue::string(&"v".repeat(self.rng.gen_range(0..64))),
            1 => StoreValue::list(&refs),
            2 => StoreValue::set(&refs),
            3 => StoreValue::sorted_set(&refs),
            _ => {
                let pairs: Vec<(&str, &str)> = refs.iter().map(|f| (*f, "value")).collect();
                StoreValue::hash(&pairs)
            }
        }
    }

    fn expected_size(&self, key: &str) -> u64 {
        if self.failing.contains(key) {
            return 0;
        }
        self.expected_sizes.get(key).copied().unwrap_or(0)
    }

    fn run_single_op(&mut self) {
        let fault = !self.keys.is_empty() && self.rng.gen_bool(self.config.fault_prob);

        if fault {
            let key = self.keys[self.rng.gen_range(0..self.keys.len())].clone();
            if self.rng.gen_bool(0.5) {
                self.result.last_op = Some(ClassifierOp::Expire { key: key.clone() });
                self.store.expire_after_scan(&key);
                self.expected_sizes.insert(key.clone(), 0);
                self.expired.insert(key);
                self.result.expires += 1;
            } else {
                self.result.last_op = Some(ClassifierOp::FailReads { key: key.clone() });
                self.store.fail_reads(&key);
                self.failing.insert(key);
                self.result.failures_injected += 1;
            }
        } else {
            let key = self.random_key();
            let value = self.random_value();
            self.result.last_op = Some(ClassifierOp::Insert { key: key.clone() });

            if !self.expected_sizes.contains_key(&key) {
                self.keys.push(key.clone());
            }
            self.expected_sizes.insert(key.clone(), estimate(&value));
            self.expired.remove(&key);
            self.store.insert(&key, value);
            self.result.inserts += 1;
        }

        self.result.total_operations += 1;

        if self.result.total_operations % self.config.check_every.max(1) as u64 == 0 {
            self.check_pass();
        }
    }

    fn check_pass(&mut self) {
        self.result.passes += 1;
        if let Err(violation) = self.check_invariants() {
            self.result.invariant_violations.push(format!(
                "Op #{}: {:?} - {}",
                self.result.total_operations, self.result.last_op, violation
            ));
        }
    }

    fn classify(&self, workers: usize, batch_size: usize) -> Classification {
        let config = ClassifierConfig {
            estimate_sizes: true,
            workers,
            batch_size,
        };
        KeyspaceClassifier::new(&self.registry, config).classify_keys(&self.store, &self.keys)
    }

    fn check_invariants(&self) -> Result<(), String> {
        let sequential = self.classify(1, self.config.batch_size);
        let parallel = self.classify(self.config.workers, self.config.batch_size);

        // Invariant 1: every key processed exactly once
        if sequential.processed != self.keys.len() as u64 {
            return Err(format!(
                "Processed mismatch: processed={}, keys={}",
                sequential.processed,
                self.keys.len()
            ));
        }

        // Invariant 2: parallel and sequential agree
        if parallel.processed != sequential.processed
            || parallel.size_failures != sequential.size_failures
            || parallel.key_sizes != sequential.key_sizes
        {
            return Err(format!(
                "Parallel totals differ: processed {}/{}, failures {}/{}",
                parallel.processed,
                sequential.processed,
                parallel.size_failures,
                sequential.size_failures
            ));
        }
        if parallel.groups.len() != sequential.groups.len() {
            return Err(format!(
                "Group count differs: parallel={}, sequential={}",
                parallel.groups.len(),
                sequential.groups.len()
            ));
        }
        for (group, expected) in &sequential.groups {
            let Some(actual) = parallel.group(group) else {
                return Err(format!("Group {} missing from parallel pass", group));
            };
            if actual.size != expected.size {
                return Err(format!(
                    "Group {} size differs: parallel={}, sequential={}",
                    group, actual.size, expected.size
                ));
            }
            let mut a = actual.keys.clone();
            let mut e = expected.keys.clone();
            a.sort();
            e.sort();
            if a != e {
                return Err(format!("Group {} membership differs", group));
            }
        }

        // Invariant 3: sizes follow the model, failures counted
        for key in &self.keys {
            let expected = self.expected_size(key);
            let actual = sequential.key_size(key);
            if actual != expected {
                return Err(format!(
                    "Size of '{}' is {}, expected {}",
                    key, actual, expected
                ));
            }
        }
        let failing = self.failing.len() as u64;
        if sequential.size_failures != failing {
            return Err(format!(
                "Size failures {} != injected {}",
                sequential.size_failures, failing
            ));
        }

        for (group, members) in &sequential.groups {
            // Invariant 4: buckets partition the group
            if let Some(breakdown) = partition_group(&self.registry, &sequential, group) {
                if breakdown.total_count() != members.count()
                    || breakdown.total_size() != members.size
                {
                    return Err(format!(
                        "Buckets of {} sum to {}/{} but group has {}/{}",
                        group,
                        breakdown.total_count(),
                        breakdown.total_size(),
                        members.count(),
                        members.size
                    ));
                }
            } else if matches!(group, GroupId::Registered(_)) {
                return Err(format!("No breakdown for registered group {}", group));
            }

            // Invariant 5: membership is the registry's verdict
            for key in &members.keys {
                let verdict = self
                    .registry
                    .classify(key)
                    .map(|(g, _)| g)
                    .unwrap_or(GroupId::Unregistered);
                if &verdict != group {
                    return Err(format!(
                        "Key '{}' filed under {} but classifies as {}",
                        key, group, verdict
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                return;
            }
        }
        if self.result.total_operations % self.config.check_every.max(1) as u64 != 0 {
            self.check_pass();
        }
    }

    pub fn result(&self) -> &ClassifierDSTResult {
        &self.result
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

/// Run a batch of DST tests
pub fn run_classifier_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> ClassifierDSTConfig,
) -> Vec<ClassifierDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = ClassifierDSTHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_classifier_batch(results: &[ClassifierDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let total_passes: u64 = results.iter().map(|r| r.passes).sum();

    let mut summary = format!(
        "Classifier DST Summary\n\
         ======================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {}, classification passes: {}\n",
        total, passed, failed, total_ops, total_passes
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_dst_single_seed() {
        let mut harness = ClassifierDSTHarness::with_seed(12345);
        harness.run(200);
        let result = harness.result();
        println!("{}", result.summary());
        assert!(result.is_success(), "Seed 12345 failed: {:?}", result.invariant_violations);
        assert!(result.passes >= 4);
    }

    #[test]
    fn test_classifier_dst_is_reproducible() {
        let mut a = ClassifierDSTHarness::with_seed(7);
        let mut b = ClassifierDSTHarness::with_seed(7);
        a.run(150);
        b.run(150);
        assert_eq!(a.result().inserts, b.result().inserts);
        assert_eq!(a.result().expires, b.result().expires);
        assert_eq!(a.store().len(), b.store().len());
    }

    #[test]
    fn test_classifier_dst_10_seeds_hostile() {
        let results = run_classifier_batch(0, 10, 200, ClassifierDSTConfig::hostile_store);
        let summary = summarize_classifier_batch(&results);
        println!("{}", summary);

        let passed = results.iter().filter(|r| r.is_success()).count();
        assert_eq!(passed, 10, "All 10 seeds should pass");
    }
}
