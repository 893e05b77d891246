//! Key template sources
//!
//! A template names a key layout: literal segments joined by `:` with
//! upper-case tokens standing for variable parts, e.g. `orders:ACCOUNT_ID:status`.
//!
//! Template file format (TOML):
//!
//! ```toml
//! partition_token = "ACCOUNT_ID"
//!
//! [[keys]]
//! name = "orders"
//! template = "orders:ACCOUNT_ID"
//!
//! # Keys owned by third-party libraries rather than the application
//! [[guest_keys]]
//! name = "resque_jobs"
//! template = "resque:QUEUE_NAME"
//! ```

use crate::error::TemplateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A key-name template such as `orders:ACCOUNT_ID`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTemplate(String);

impl KeyTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        KeyTemplate(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyTemplate {
    fn from(s: &str) -> Self {
        KeyTemplate(s.to_string())
    }
}

/// Everything the registry is built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
    /// Templates in registration order
    pub templates: Vec<KeyTemplate>,
    /// Token whose value partitions the reports, e.g. `ACCOUNT_ID`
    pub partition_token: Option<String>,
}

impl TemplateSet {
    pub fn new(templates: &[&str], partition_token: Option<&str>) -> Self {
        TemplateSet {
            templates: templates.iter().map(|t| KeyTemplate::new(*t)).collect(),
            partition_token: partition_token.map(str::to_string),
        }
    }
}

/// Where the list of known key templates comes from
pub trait TemplateSource {
    fn list_key_templates(&self) -> Result<TemplateSet, TemplateError>;
}

/// Templates supplied directly in code
#[derive(Debug, Clone, Default)]
pub struct StaticTemplates {
    set: TemplateSet,
}

impl StaticTemplates {
    pub fn new(set: TemplateSet) -> Self {
        StaticTemplates { set }
    }
}

impl TemplateSource for StaticTemplates {
    fn list_key_templates(&self) -> Result<TemplateSet, TemplateError> {
        Ok(self.set.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    partition_token: Option<String>,
    #[serde(default)]
    keys: Vec<TemplateEntry>,
    #[serde(default)]
    guest_keys: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    #[serde(default)]
    name: Option<String>,
    template: String,
}

/// Templates read from a TOML file
#[derive(Debug, Clone)]
pub struct TomlTemplates {
    path: PathBuf,
}

impl TomlTemplates {
    pub fn new(path: impl AsRef<Path>) -> Self {
        TomlTemplates {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse template file contents. Application keys register before guest keys.
    pub fn parse(contents: &str, path: &Path) -> Result<TemplateSet, TemplateError> {
        let file: TemplateFile = toml::from_str(contents).map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut templates = Vec::with_capacity(file.keys.len() + file.guest_keys.len());
        for (entry, guest) in file
            .keys
            .into_iter()
            .map(|e| (e, false))
            .chain(file.guest_keys.into_iter().map(|e| (e, true)))
        {
            debug!(
                name = entry.name.as_deref().unwrap_or("-"),
                template = %entry.template,
                guest,
                "Registered key template"
            );
            templates.push(KeyTemplate::new(entry.template));
        }

        Ok(TemplateSet {
            templates,
            partition_token: file.partition_token.filter(|t| !t.is_empty()),
        })
    }
}

impl TemplateSource for TomlTemplates {
    fn list_key_templates(&self) -> Result<TemplateSet, TemplateError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| TemplateError::Io {
            path: self.path.clone(),
            source,
        })?;
        Self::parse(&contents, &self.path)
    }
}
