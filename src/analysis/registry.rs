//! Matcher registry
//!
//! Holds one compiled [`Matcher`] per template, ordered by descending
//! template length so longer, more literal templates are tried first.
//! Lookup returns the first match. Templates of equal length keep their
//! registration order (the sort is stable), so among equal-length templates
//! that can match the same key, the one registered first wins.

use super::template::Matcher;
use crate::templates::{KeyTemplate, TemplateSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

const REGISTERED_PREFIX: &str = "registered:";
const UNREGISTERED: &str = "unregistered";

/// Name of a key group: one per registered template, plus the catch-all
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GroupId {
    Registered(KeyTemplate),
    Unregistered,
}

impl GroupId {
    pub fn template(&self) -> Option<&KeyTemplate> {
        match self {
            GroupId::Registered(template) => Some(template),
            GroupId::Unregistered => None,
        }
    }

    /// Name shown in reports: the bare template, or `unregistered`
    pub fn display_name(&self) -> &str {
        match self {
            GroupId::Registered(template) => template.as_str(),
            GroupId::Unregistered => UNREGISTERED,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Registered(template) => write!(f, "{}{}", REGISTERED_PREFIX, template),
            GroupId::Unregistered => f.write_str(UNREGISTERED),
        }
    }
}

impl From<GroupId> for String {
    fn from(group: GroupId) -> String {
        group.to_string()
    }
}

/// A group name that is neither `unregistered` nor `registered:<template>`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown group name {0:?}")]
pub struct UnknownGroupName(pub String);

impl TryFrom<String> for GroupId {
    type Error = UnknownGroupName;

    fn try_from(name: String) -> Result<GroupId, UnknownGroupName> {
        if name == UNREGISTERED {
            return Ok(GroupId::Unregistered);
        }
        match name.strip_prefix(REGISTERED_PREFIX) {
            Some(template) if !template.is_empty() => {
                Ok(GroupId::Registered(KeyTemplate::new(template)))
            }
            _ => Err(UnknownGroupName(name)),
        }
    }
}

/// Ordered set of compiled templates
///
/// Compilation is lazy and happens once; `reset` discards the compiled
/// matchers so the next lookup recompiles from the current templates.
#[derive(Debug, Default)]
pub struct Registry {
    templates: TemplateSet,
    matchers: OnceLock<Vec<Matcher>>,
}

impl Registry {
    pub fn new(templates: TemplateSet) -> Self {
        Registry {
            templates,
            matchers: OnceLock::new(),
        }
    }

    /// Build and compile eagerly
    pub fn build(templates: TemplateSet) -> Self {
        let registry = Self::new(templates);
        registry.matchers();
        registry
    }

    /// Discard compiled matchers
    pub fn reset(&mut self) {
        self.matchers = OnceLock::new();
    }

    /// Replace the template set and discard compiled matchers
    pub fn replace_templates(&mut self, templates: TemplateSet) {
        self.templates = templates;
        self.reset();
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn partition_token(&self) -> Option<&str> {
        self.templates.partition_token.as_deref()
    }

    /// Matchers in lookup order
    pub fn matchers(&self) -> &[Matcher] {
        self.matchers.get_or_init(|| {
            let token = self.templates.partition_token.as_deref();
            let mut matchers: Vec<Matcher> = self
                .templates
                .templates
                .iter()
                .map(|t| Matcher::compile(t, token))
                .collect();
            matchers.sort_by(|a, b| b.template().len().cmp(&a.template().len()));
            debug!(count = matchers.len(), "Compiled key templates");
            matchers
        })
    }

    pub fn len(&self) -> usize {
        self.templates.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.templates.is_empty()
    }

    /// Group and matcher owning `key`, or `None` if no template matches
    pub fn classify(&self, key: &str) -> Option<(GroupId, &Matcher)> {
        self.who_matches(key)
            .map(|m| (GroupId::Registered(m.template().clone()), m))
    }

    /// First matcher (in specificity order) that matches `key`
    pub fn who_matches(&self, key: &str) -> Option<&Matcher> {
        self.matchers().iter().find(|m| m.matches(key).is_some())
    }

    /// Matcher compiled from exactly `template`
    pub fn matcher_for(&self, template: &KeyTemplate) -> Option<&Matcher> {
        self.matchers().iter().find(|m| m.template() == template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(templates: &[&str]) -> Registry {
        Registry::build(TemplateSet::new(templates, Some("ACCOUNT_ID")))
    }

    #[test]
    fn test_longer_template_wins_regardless_of_order() {
        for templates in [
            ["orders:ACCOUNT_ID", "orders:ACCOUNT_ID:status"],
            ["orders:ACCOUNT_ID:status", "orders:ACCOUNT_ID"],
        ] {
            let reg = registry(&templates);
            let (group, _) = reg.classify("orders:42:status").unwrap();
            assert_eq!(
                group,
                GroupId::Registered(KeyTemplate::new("orders:ACCOUNT_ID:status"))
            );
            let (group, _) = reg.classify("orders:42").unwrap();
            assert_eq!(group, GroupId::Registered(KeyTemplate::new("orders:ACCOUNT_ID")));
        }
    }

    #[test]
    fn test_equal_length_first_registered_wins() {
        // Same length, both match "a:x:y"
        let reg = registry(&["a:ID:y", "a:x:ID"]);
        assert_eq!(reg.who_matches("a:x:y").unwrap().template().as_str(), "a:ID:y");

        let reg = registry(&["a:x:ID", "a:ID:y"]);
        assert_eq!(reg.who_matches("a:x:y").unwrap().template().as_str(), "a:x:ID");
    }

    #[test]
    fn test_unmatched_key() {
        let reg = registry(&["orders:ACCOUNT_ID"]);
        assert!(reg.classify("carts:1").is_none());
        assert!(reg.who_matches("orders:1:2").is_none());
    }

    #[test]
    fn test_reset_recompiles_from_current_templates() {
        let mut reg = registry(&["orders:ACCOUNT_ID"]);
        assert!(reg.who_matches("carts:1").is_none());

        reg.replace_templates(TemplateSet::new(&["carts:ACCOUNT_ID"], Some("ACCOUNT_ID")));
        assert!(reg.who_matches("carts:1").is_some());
        assert!(reg.who_matches("orders:1").is_none());

        reg.reset();
        assert_eq!(reg.matchers().len(), 1);
    }

    #[test]
    fn test_matcher_for_exact_template() {
        let reg = registry(&["orders:ID", "orders:ACCOUNT_ID"]);
        let template = KeyTemplate::new("orders:ID");
        assert_eq!(reg.matcher_for(&template).unwrap().template(), &template);
        // who_matches on the template text resolves to the longer, equivalent pattern
        assert_eq!(
            reg.who_matches("orders:ID").unwrap().template().as_str(),
            "orders:ACCOUNT_ID"
        );
    }

    #[test]
    fn test_group_id_names() {
        let group = GroupId::Registered(KeyTemplate::new("orders:ACCOUNT_ID"));
        assert_eq!(group.to_string(), "registered:orders:ACCOUNT_ID");
        assert_eq!(group.display_name(), "orders:ACCOUNT_ID");
        assert_eq!(GroupId::Unregistered.to_string(), "unregistered");
        assert_eq!(GroupId::try_from(group.to_string()).unwrap(), group);
        assert_eq!(
            GroupId::try_from("unregistered".to_string()).unwrap(),
            GroupId::Unregistered
        );
    }

    #[test]
    fn test_unknown_group_names_are_rejected() {
        for name in ["orders:ACCOUNT_ID", "registered:", "Unregistered", ""] {
            assert_eq!(
                GroupId::try_from(name.to_string()),
                Err(UnknownGroupName(name.to_string()))
            );
        }
    }

    #[test]
    fn test_group_id_order_matches_name_order() {
        let mut groups = vec![
            GroupId::Unregistered,
            GroupId::Registered(KeyTemplate::new("b")),
            GroupId::Registered(KeyTemplate::new("a:ID")),
        ];
        groups.sort();
        let names: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
