//! Template compilation
//!
//! Every maximal run of upper-case tokens (`ID`, `ACCOUNT_ID`, `QUEUE_NAME`)
//! in a template becomes a capture matching one or more non-`:` characters.
//! Everything else is literal and must match exactly. Patterns are anchored
//! at both ends, so a key matches only if the whole key fits the template.
//!
//! The match is structural, not semantic: `orders:ACCOUNT_ID` matches
//! `orders:other` just as it matches `orders:42`.

use crate::templates::KeyTemplate;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::debug;

/// Partition value used when a key has none to offer
pub const NO_PARTITION_VALUE: &str = "no_partition_value";

fn variable_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| Regex::new(r"[A-Z]+(?:_[A-Z]+)*").expect("hardcoded pattern must compile"))
}

/// Result of a successful [`Matcher::matches`] call, borrowed from the key
#[derive(Debug)]
pub struct MatchResult<'k> {
    captures: Captures<'k>,
}

impl<'k> MatchResult<'k> {
    /// Capture at `position` (0 = the whole key)
    pub fn capture(&self, position: usize) -> Option<&'k str> {
        self.captures.get(position).map(|m| m.as_str())
    }
}

/// A compiled key template
///
/// Immutable once built; match state is returned to the caller as a
/// [`MatchResult`] instead of being stored, so one matcher can serve many
/// threads at once.
#[derive(Debug, Clone)]
pub struct Matcher {
    template: KeyTemplate,
    /// `None` when the template could not be turned into a pattern;
    /// such a matcher never matches.
    pattern: Option<Regex>,
    partition_position: Option<usize>,
}

impl Matcher {
    /// Compile `template`. Never fails: an uncompilable template yields a
    /// matcher that matches nothing.
    pub fn compile(template: &KeyTemplate, partition_token: Option<&str>) -> Self {
        let source = template.as_str();
        let mut pattern = String::with_capacity(source.len() + 16);
        pattern.push('^');

        let mut literal_start = 0;
        let mut captures = 0;
        let mut partition_position = None;

        for run in variable_run().find_iter(source) {
            pattern.push_str(&regex::escape(&source[literal_start..run.start()]));
            pattern.push_str("([^:]+)");
            captures += 1;
            if partition_position.is_none() && partition_token == Some(run.as_str()) {
                partition_position = Some(captures);
            }
            literal_start = run.end();
        }
        pattern.push_str(&regex::escape(&source[literal_start..]));
        pattern.push('$');

        let pattern = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                debug!(template = %template, error = %e, "Template degraded to never-matching");
                None
            }
        };

        Matcher {
            template: template.clone(),
            pattern,
            partition_position,
        }
    }

    pub fn template(&self) -> &KeyTemplate {
        &self.template
    }

    /// Capture position of the partition token, counting the whole match as 0
    pub fn partition_position(&self) -> Option<usize> {
        self.partition_position
    }

    /// Match `key` against the whole template
    pub fn matches<'k>(&self, key: &'k str) -> Option<MatchResult<'k>> {
        self.pattern
            .as_ref()?
            .captures(key)
            .map(|captures| MatchResult { captures })
    }

    /// Partition value captured by a previous match
    pub fn partition_value<'k>(&self, result: &MatchResult<'k>) -> Option<&'k str> {
        result.capture(self.partition_position?)
    }

    /// Match and extract in one step
    pub fn partition_value_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        self.matches(key)
            .and_then(|result| self.partition_value(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str, token: Option<&str>) -> Matcher {
        Matcher::compile(&KeyTemplate::new(template), token)
    }

    #[test]
    fn test_literal_template() {
        let m = compile("config:global", None);
        assert!(m.matches("config:global").is_some());
        assert!(m.matches("config:global:x").is_none());
        assert!(m.matches("xconfig:global").is_none());
    }

    #[test]
    fn test_variable_segment_matches_non_separator_run() {
        let m = compile("user:ID:profile", None);
        assert!(m.matches("user:42:profile").is_some());
        assert!(m.matches("user:a-b.c:profile").is_some());
        assert!(m.matches("user::profile").is_none());
        assert!(m.matches("user:4:2:profile").is_none());
    }

    #[test]
    fn test_partition_position_counts_from_one() {
        let m = compile("orders:SHOP_ID:ACCOUNT_ID:items", Some("ACCOUNT_ID"));
        assert_eq!(m.partition_position(), Some(2));
        let result = m.matches("orders:s1:a9:items").unwrap();
        assert_eq!(m.partition_value(&result), Some("a9"));
        assert_eq!(result.capture(0), Some("orders:s1:a9:items"));
    }

    #[test]
    fn test_no_partition_token_in_template() {
        let m = compile("session:SESSION_ID", Some("ACCOUNT_ID"));
        assert_eq!(m.partition_position(), None);
        let result = m.matches("session:abc").unwrap();
        assert_eq!(m.partition_value(&result), None);
    }

    #[test]
    fn test_no_partition_token_declared() {
        let m = compile("orders:ACCOUNT_ID", None);
        assert_eq!(m.partition_value_of("orders:42"), None);
    }

    #[test]
    fn test_literal_metacharacters_are_escaped() {
        let m = compile("cache.v2:ID", None);
        assert!(m.matches("cache.v2:1").is_some());
        assert!(m.matches("cacheXv2:1").is_none());
    }

    #[test]
    fn test_run_inside_segment() {
        // Only the upper-case run is variable; the lower-case prefix is literal
        let m = compile("jobQUEUE:ID", Some("QUEUE"));
        assert_eq!(m.partition_value_of("jobmailers:7"), Some("mailers"));
        assert!(m.matches("mailers:7").is_none());
    }

    #[test]
    fn test_structural_match_is_preserved() {
        let m = compile("orders:ACCOUNT_ID", Some("ACCOUNT_ID"));
        assert_eq!(m.partition_value_of("orders:other"), Some("other"));
    }

    #[test]
    fn test_repeated_partition_token_uses_first() {
        let m = compile("link:ACCOUNT_ID:ACCOUNT_ID", Some("ACCOUNT_ID"));
        assert_eq!(m.partition_value_of("link:a:b"), Some("a"));
    }

    #[test]
    fn test_failed_match_has_no_partition() {
        let m = compile("orders:ACCOUNT_ID", Some("ACCOUNT_ID"));
        assert!(m.partition_value_of("carts:1").is_none());
    }
}
