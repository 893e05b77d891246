//! Key count cross-check
//!
//! Scans are not transactional: keys expire and get created while a long
//! scan runs, so a small disagreement between the store's own key count and
//! the number of keys classified is normal. It is reported with its delta;
//! the caller decides whether it is fatal.

use super::classifier::Classification;
use crate::error::{AnalysisError, StoreError};
use crate::store::StoreReader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityReport {
    /// Count reported by the store
    pub expected: u64,
    /// Keys the classifier processed
    pub actual: u64,
}

impl SanityReport {
    pub fn new(expected: u64, actual: u64) -> Self {
        let report = SanityReport { expected, actual };
        if report.is_consistent() {
            info!(keys = actual, "Key count matches store");
        } else {
            warn!(
                expected,
                actual,
                delta = report.delta(),
                "Key count mismatch between store and analysis"
            );
        }
        report
    }

    pub fn is_consistent(&self) -> bool {
        self.expected == self.actual
    }

    /// `expected - actual`; positive when the store holds keys the scan missed
    pub fn delta(&self) -> i64 {
        self.expected as i64 - self.actual as i64
    }

    pub fn mismatch(&self) -> u64 {
        self.expected.abs_diff(self.actual)
    }

    /// Turn a mismatch into an error, for callers that treat it as fatal
    pub fn into_result(self) -> Result<Self, AnalysisError> {
        if self.is_consistent() {
            Ok(self)
        } else {
            Err(AnalysisError::IntegrityMismatch {
                expected: self.expected,
                actual: self.actual,
            })
        }
    }
}

/// Compare the store's key count against a finished classification
pub fn check<S: StoreReader + ?Sized>(
    store: &S,
    classification: &Classification,
) -> Result<SanityReport, StoreError> {
    let expected = store.reported_key_count()?;
    Ok(SanityReport::new(expected, classification.processed))
}
