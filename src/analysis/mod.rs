//! Keyspace analysis
//!
//! Template compilation and matching, the matcher registry, size
//! estimation, classification, partition breakdown and the key count
//! cross-check, plus run orchestration tying them together.

mod classifier;
mod partition;
mod registry;
mod run;
mod sanity;
mod size;
mod snapshot;
mod stray;
mod template;

// DST modules
pub mod classifier_dst;

pub use classifier::{Classification, ClassifierConfig, KeyGroup, KeyspaceClassifier};
pub use classifier_dst::{
    run_classifier_batch, summarize_classifier_batch, ClassifierDSTConfig, ClassifierDSTHarness,
    ClassifierDSTResult, ClassifierOp,
};
pub use partition::{aggregate, group_matcher, partition_group, PartitionBreakdown, PartitionBucket};
pub use registry::{GroupId, Registry, UnknownGroupName};
pub use run::{
    report_from_snapshot, run_analysis, AnalysisOptions, AnalysisOutcome, PhaseTimings,
    ReportOutcome, ReportTargets,
};
pub use sanity::{check as sanity_check, SanityReport};
pub use size::{estimate, estimate_key, ENTRY_OVERHEAD};
pub use snapshot::{load_snapshot, save_snapshot};
pub use stray::{stray_label, summarize_stray_keys, StrayLabel};
pub use template::{MatchResult, Matcher, NO_PARTITION_VALUE};
