//! Analysis configuration
//!
//! Loaded from an optional TOML file named by `ANALYSIS_CONFIG`, then
//! overridden by environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | ANALYSIS_STORE_ADDR | 127.0.0.1:6379 | Store to analyse |
//! | ANALYSIS_STORE_DB | 0 | Logical database index |
//! | ANALYSIS_TIMEOUT_SECS | 60 | Store read/write timeout |
//! | ANALYSIS_TEMPLATES | keys.toml | Key template file |
//! | ANALYSIS_ESTIMATE_SIZES | true | Estimate per-key sizes |
//! | ANALYSIS_WORKERS | 1 | Classifier worker threads |
//! | ANALYSIS_BATCH_SIZE | 1000 | Keys per worker batch and SCAN COUNT |
//! | ANALYSIS_OUTPUT_DIR | . | Directory for report files |
//! | ANALYSIS_STRICT_SANITY | false | Fail the run on a key count mismatch |
//! | ANALYSIS_SNAPSHOT | (unset) | Write the classification to this JSON file |
//! | ANALYSIS_FROM_SNAPSHOT | (unset) | Rebuild reports from this snapshot, no scan |
//! | ANALYSIS_PARTITION_INFO | (unset) | CSV of extra columns per partition value |
//! | ANALYSIS_LOG_FORMAT | text | `text` or `json` |

use crate::analysis::ClassifierConfig;
use crate::error::ConfigError;
use crate::store::RespStoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const SIZE_REPORT_FILE: &str = "redis_analysis_w_size.csv";
pub const PARTITION_REPORT_FILE: &str = "redis_analysis_by_partition.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub store_addr: String,
    pub store_db: u32,
    pub timeout_secs: u64,
    pub templates_path: PathBuf,
    pub estimate_sizes: bool,
    pub workers: usize,
    pub batch_size: usize,
    pub output_dir: PathBuf,
    pub strict_sanity: bool,
    pub snapshot_path: Option<PathBuf>,
    /// Regenerate reports from this snapshot instead of scanning the store
    pub from_snapshot: Option<PathBuf>,
    pub partition_info_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            store_addr: "127.0.0.1:6379".to_string(),
            store_db: 0,
            timeout_secs: 60,
            templates_path: PathBuf::from("keys.toml"),
            estimate_sizes: true,
            workers: 1,
            batch_size: 1000,
            output_dir: PathBuf::from("."),
            strict_sanity: false,
            snapshot_path: None,
            from_snapshot: None,
            partition_info_path: None,
            log_format: LogFormat::Text,
        }
    }
}

impl AnalysisConfig {
    /// Load from `ANALYSIS_CONFIG` (if set) and the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("ANALYSIS_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ANALYSIS_STORE_ADDR") {
            self.store_addr = addr;
        }
        if let Some(db) = parse_var(lookup, "ANALYSIS_STORE_DB")? {
            self.store_db = db;
        }
        if let Some(secs) = parse_var(lookup, "ANALYSIS_TIMEOUT_SECS")? {
            self.timeout_secs = secs;
        }
        if let Some(path) = lookup("ANALYSIS_TEMPLATES") {
            self.templates_path = PathBuf::from(path);
        }
        if let Some(flag) = parse_bool(lookup, "ANALYSIS_ESTIMATE_SIZES")? {
            self.estimate_sizes = flag;
        }
        if let Some(workers) = parse_var(lookup, "ANALYSIS_WORKERS")? {
            self.workers = workers;
        }
        if let Some(batch) = parse_var(lookup, "ANALYSIS_BATCH_SIZE")? {
            self.batch_size = batch;
        }
        if let Some(dir) = lookup("ANALYSIS_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(flag) = parse_bool(lookup, "ANALYSIS_STRICT_SANITY")? {
            self.strict_sanity = flag;
        }
        if let Some(path) = lookup("ANALYSIS_SNAPSHOT") {
            self.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("ANALYSIS_FROM_SNAPSHOT") {
            self.from_snapshot = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("ANALYSIS_PARTITION_INFO") {
            self.partition_info_path = Some(PathBuf::from(path));
        }
        if let Some(format) = parse_var(lookup, "ANALYSIS_LOG_FORMAT")? {
            self.log_format = format;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                var: "workers",
                value: "0".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "batch_size",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn store_config(&self) -> RespStoreConfig {
        RespStoreConfig {
            addr: self.store_addr.clone(),
            db: self.store_db,
            timeout: Duration::from_secs(self.timeout_secs),
            scan_count: self.batch_size,
            max_idle: self.workers.max(1),
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            estimate_sizes: self.estimate_sizes,
            workers: self.workers,
            batch_size: self.batch_size,
        }
    }

    pub fn size_report_path(&self) -> PathBuf {
        self.output_dir.join(SIZE_REPORT_FILE)
    }

    pub fn partition_report_path(&self) -> PathBuf {
        self.output_dir.join(PARTITION_REPORT_FILE)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).as_deref().map(str::trim) {
        None => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(ConfigError::InvalidValue {
            var,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.store_config().timeout, Duration::from_secs(60));
        assert_eq!(
            config.size_report_path(),
            PathBuf::from("./redis_analysis_w_size.csv")
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = AnalysisConfig::from_lookup(lookup_from(&[
            ("ANALYSIS_STORE_ADDR", "redis.internal:6380"),
            ("ANALYSIS_STORE_DB", "2"),
            ("ANALYSIS_ESTIMATE_SIZES", "0"),
            ("ANALYSIS_WORKERS", "8"),
            ("ANALYSIS_LOG_FORMAT", "JSON"),
            ("ANALYSIS_SNAPSHOT", "/tmp/snap.json"),
            ("ANALYSIS_FROM_SNAPSHOT", "/tmp/old.json"),
        ]))
        .unwrap();

        assert_eq!(config.store_addr, "redis.internal:6380");
        assert_eq!(config.store_db, 2);
        assert!(!config.estimate_sizes);
        assert_eq!(config.workers, 8);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/snap.json")));
        assert_eq!(config.from_snapshot, Some(PathBuf::from("/tmp/old.json")));
        assert_eq!(config.classifier_config().workers, 8);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("ANALYSIS_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "ANALYSIS_WORKERS",
                ..
            }
        ));

        assert!(
            AnalysisConfig::from_lookup(lookup_from(&[("ANALYSIS_STRICT_SANITY", "yes")]))
                .is_err()
        );
        assert!(AnalysisConfig::from_lookup(lookup_from(&[("ANALYSIS_WORKERS", "0")])).is_err());
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "store_addr = \"10.0.0.5:6379\"\nworkers = 4\nstrict_sanity = true\nlog_format = \"json\""
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = AnalysisConfig::from_lookup(lookup_from(&[
            ("ANALYSIS_CONFIG", path.as_str()),
            ("ANALYSIS_WORKERS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.store_addr, "10.0.0.5:6379");
        assert!(config.strict_sanity);
        assert_eq!(config.workers, 2);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_config_file() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[(
            "ANALYSIS_CONFIG",
            "/nonexistent/analysis.toml",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
