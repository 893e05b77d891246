//! Property tests for template matching and size estimation
//!
//! Size estimates grow with every added element and every added byte, for
//! each value type.

use keyspace_analysis::analysis::{estimate, Matcher};
use keyspace_analysis::{KeyTemplate, StoreValue};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_.-]{1,12}"
}

proptest! {
    /// Test: substituting any non-empty, colon-free values into a template
    /// yields a key that matches and gives back the partition value.
    #[test]
    fn test_substituted_key_matches_and_extracts(
        prefix in "[a-z]{1,8}",
        account in segment(),
        item in segment(),
    ) {
        let template = KeyTemplate::new(format!("{}:ACCOUNT_ID:ITEM_ID:meta", prefix));
        let matcher = Matcher::compile(&template, Some("ACCOUNT_ID"));
        let key = format!("{}:{}:{}:meta", prefix, account, item);

        let result = matcher.matches(&key);
        prop_assert!(result.is_some());
        prop_assert_eq!(matcher.partition_value_of(&key), Some(account.as_str()));
    }

    /// Test: a variable never spans a separator
    #[test]
    fn test_variable_rejects_colon(a in segment(), b in segment()) {
        let matcher = Matcher::compile(&KeyTemplate::new("orders:ACCOUNT_ID"), Some("ACCOUNT_ID"));
        let key = format!("orders:{}:{}", a, b);
        prop_assert!(matcher.matches(&key).is_none());
    }

    /// Test: literal text in a template is matched literally, never as a pattern
    #[test]
    fn test_literals_are_escaped(id in segment()) {
        let matcher = Matcher::compile(&KeyTemplate::new("cache.v1+(x):ID"), None);
        let exact = format!("cache.v1+(x):{}", id);
        let mangled = format!("cacheXv1+(x):{}", id);
        prop_assert!(matcher.matches(&exact).is_some());
        prop_assert!(matcher.matches(&mangled).is_none());
    }

    /// Test: adding an element never shrinks a collection's estimate
    #[test]
    fn test_estimate_monotone_in_elements(
        items in proptest::collection::vec("[a-z]{0,16}", 0..20),
        extra in "[a-z]{0,16}",
    ) {
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let mut grown = refs.clone();
        grown.push(extra.as_str());

        let before = estimate(&StoreValue::list(&refs));
        let after = estimate(&StoreValue::list(&grown));
        prop_assert!(after > before);
        prop_assert_eq!(after - before, 1 + extra.len() as u64);
    }

    /// Test: a new set or sorted set member adds exactly its entry cost
    #[test]
    fn test_member_collections_monotone(
        members in proptest::collection::vec("[a-z]{0,16}", 0..20),
        extra in "[a-z]{0,16}",
    ) {
        let refs: Vec<&str> = members.iter().map(String::as_str).collect();
        let mut grown = refs.clone();
        grown.push(extra.as_str());

        for (before, after) in [
            (StoreValue::set(&refs), StoreValue::set(&grown)),
            (StoreValue::sorted_set(&refs), StoreValue::sorted_set(&grown)),
        ] {
            prop_assert!(estimate(&after) > estimate(&before));
            prop_assert_eq!(estimate(&after) - estimate(&before), 1 + extra.len() as u64);
        }
    }

    /// Test: a new hash field adds the cost of its name and its value
    #[test]
    fn test_hash_monotone_in_fields(
        pairs in proptest::collection::vec(("[a-z]{0,8}", "[a-z0-9]{0,16}"), 0..20),
        field in "[a-z]{0,8}",
        value in "[a-z0-9]{0,16}",
    ) {
        let refs: Vec<(&str, &str)> = pairs.iter().map(|(f, v)| (f.as_str(), v.as_str())).collect();
        let mut grown = refs.clone();
        grown.push((field.as_str(), value.as_str()));

        let before = estimate(&StoreValue::hash(&refs));
        let after = estimate(&StoreValue::hash(&grown));
        prop_assert!(after > before);
        prop_assert_eq!(after - before, 2 + field.len() as u64 + value.len() as u64);
    }

    /// Test: a longer hash value never estimates smaller
    #[test]
    fn test_hash_monotone_in_value_length(
        field in "[a-z]{1,8}",
        value in "[a-z]{0,16}",
        tail in "[a-z]{0,8}",
    ) {
        let longer = format!("{}{}", value, tail);
        prop_assert!(
            estimate(&StoreValue::hash(&[(field.as_str(), longer.as_str())]))
                >= estimate(&StoreValue::hash(&[(field.as_str(), value.as_str())]))
        );
    }

    /// Test: a longer string never estimates smaller
    #[test]
    fn test_estimate_monotone_in_length(s in "[ -~]{0,64}", tail in "[ -~]{0,8}") {
        let longer = format!("{}{}", s, tail);
        prop_assert!(estimate(&StoreValue::string(&longer)) >= estimate(&StoreValue::string(&s)));
    }
}
