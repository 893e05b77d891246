//! Summary of unregistered keys
//!
//! Gives a first idea of which templates are missing from the registry by
//! bucketing stray keys under a coarse label: `lock` for lock keys,
//! `resque` for job queue keys, otherwise the last non-empty `:` segment.

use super::classifier::Classification;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrayLabel {
    pub label: String,
    pub count: u64,
}

/// Coarse label for an unregistered key
pub fn stray_label(key: &str) -> &str {
    if key.starts_with("lock") {
        "lock"
    } else if key.starts_with("resque:") {
        "resque"
    } else {
        key.rsplit(':').find(|segment| !segment.is_empty()).unwrap_or("")
    }
}

/// Label counts over the `unregistered` group, most frequent first
pub fn summarize_stray_keys(classification: &Classification) -> Vec<StrayLabel> {
    let Some(stray) = classification.unregistered() else {
        return Vec::new();
    };

    let mut counts: AHashMap<&str, u64> = AHashMap::new();
    for key in &stray.keys {
        *counts.entry(stray_label(key)).or_insert(0) += 1;
    }

    let mut labels: Vec<StrayLabel> = counts
        .into_iter()
        .map(|(label, count)| StrayLabel {
            label: label.to_string(),
            count,
        })
        .collect();
    labels.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::registry::GroupId;

    #[test]
    fn test_labels() {
        assert_eq!(stray_label("lock:orders:42"), "lock");
        assert_eq!(stray_label("locked_out"), "lock");
        assert_eq!(stray_label("resque:queue:mail"), "resque");
        assert_eq!(stray_label("feed:42:cache"), "cache");
        assert_eq!(stray_label("plain"), "plain");
        assert_eq!(stray_label("trailing:"), "trailing");
        assert_eq!(stray_label("feed:42::"), "42");
        assert_eq!(stray_label(":"), "");
    }

    #[test]
    fn test_summary_orders_by_count_then_label() {
        let mut c = Classification::new(false);
        for key in [
            "a:cache", "b:cache", "lock:1", "resque:q", "x:feed", "lock:2", "c:cache",
        ] {
            c.record(GroupId::Unregistered, key, None);
        }

        let summary = summarize_stray_keys(&c);
        let pairs: Vec<(&str, u64)> = summary.iter().map(|s| (s.label.as_str(), s.count)).collect();
        assert_eq!(
            pairs,
            vec![("cache", 3), ("lock", 2), ("feed", 1), ("resque", 1)]
        );
    }

    #[test]
    fn test_no_unregistered_keys() {
        assert!(summarize_stray_keys(&Classification::new(false)).is_empty());
    }
}
