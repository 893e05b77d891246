//! Partition breakdown of a key group
//!
//! Re-matches every member of a registered group against the group's
//! matcher, pulls out the partition value, and tallies count and size per
//! value. Buckets come out ordered by ascending key count so the rarest
//! partitions surface first; ties keep first-seen order.

use super::classifier::{Classification, KeyGroup};
use super::registry::{GroupId, Registry};
use super::template::{Matcher, NO_PARTITION_VALUE};
use crate::templates::KeyTemplate;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Keys of one group sharing a partition value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBucket {
    pub value: String,
    pub count: u64,
    pub size: u64,
}

/// All buckets of one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBreakdown {
    pub template: KeyTemplate,
    pub buckets: Vec<PartitionBucket>,
}

impl PartitionBreakdown {
    pub fn total_count(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.buckets.iter().map(|b| b.size).sum()
    }
}

/// Resolve the matcher owning a group's template.
///
/// Exact template lookup first; falls back to matching the template text
/// itself, which resolves to the same pattern for any group the registry
/// could have produced.
pub fn group_matcher<'r>(registry: &'r Registry, template: &KeyTemplate) -> Option<&'r Matcher> {
    registry
        .matcher_for(template)
        .or_else(|| registry.who_matches(template.as_str()))
}

/// Break `group` down by partition value using `matcher`
pub fn aggregate(
    matcher: &Matcher,
    group: &KeyGroup,
    classification: &Classification,
) -> PartitionBreakdown {
    let mut buckets: Vec<PartitionBucket> = Vec::new();
    let mut index: AHashMap<&str, usize> = AHashMap::new();

    for key in &group.keys {
        let value = matcher
            .partition_value_of(key)
            .unwrap_or(NO_PARTITION_VALUE);
        let slot = *index.entry(value).or_insert_with(|| {
            buckets.push(PartitionBucket {
                value: value.to_string(),
                count: 0,
                size: 0,
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.count += 1;
        bucket.size = bucket.size.saturating_add(classification.key_size(key));
    }

    // stable: equal counts keep first-seen order
    buckets.sort_by_key(|b| b.count);

    let breakdown = PartitionBreakdown {
        template: matcher.template().clone(),
        buckets,
    };

    // TigerStyle: Postcondition - buckets partition the group exactly
    debug_assert_eq!(
        breakdown.total_count(),
        group.count(),
        "Postcondition violated: bucket counts must sum to group count"
    );

    breakdown
}

/// Partition breakdown of one registered group.
///
/// Returns `None` for the `unregistered` group, and for a registered group
/// whose template no longer resolves to a matcher (logged; other groups are
/// unaffected).
pub fn partition_group(
    registry: &Registry,
    classification: &Classification,
    group_id: &GroupId,
) -> Option<PartitionBreakdown> {
    let template = group_id.template()?;
    let group = classification.group(group_id)?;
    match group_matcher(registry, template) {
        Some(matcher) => Some(aggregate(matcher, group, classification)),
        None => {
            warn!(
                group = %group_id,
                keys = group.count(),
                "No matcher for registered group, skipping partition breakdown"
            );
            None
        }
    }
}
