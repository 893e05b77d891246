pub mod analysis;
pub mod config;
pub mod error;
pub mod report;
pub mod store;
pub mod templates;

pub use analysis::{
    report_from_snapshot, run_analysis, AnalysisOptions, AnalysisOutcome, Classification,
    ClassifierConfig, GroupId, KeyspaceClassifier, Matcher, Registry, ReportOutcome,
    ReportTargets,
};
pub use config::{AnalysisConfig, LogFormat};
pub use error::{AnalysisError, ConfigError, ReportError, StoreError, TemplateError};
pub use report::{CsvSink, LookupEnricher, MemorySink, NoEnrichment, PartitionEnricher, ReportSink};
pub use store::{MemoryStore, RespStore, StoreReader, StoreValue, TypeTag};
pub use templates::{KeyTemplate, StaticTemplates, TemplateSet, TemplateSource, TomlTemplates};
