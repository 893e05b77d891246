//! End-to-end analysis run
//!
//! build registry → classify → sanity check → size report → partition
//! report → stray summary. Each phase is timed and logged.
//!
//! [`report_from_snapshot`] skips the scan: it reloads a saved
//! classification and runs only the report phases.

use super::classifier::{Classification, ClassifierConfig, KeyspaceClassifier};
use super::registry::Registry;
use super::sanity::{self, SanityReport};
use super::snapshot::load_snapshot;
use super::stray::{summarize_stray_keys, StrayLabel};
use crate::error::AnalysisError;
use crate::report::{write_partition_report, write_size_report, PartitionEnricher, ReportSink};
use crate::store::StoreReader;
use crate::templates::TemplateSource;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub classifier: ClassifierConfig,
    /// Abort on a key count mismatch instead of logging it
    pub strict_sanity: bool,
}

/// Where the two reports go
pub struct ReportTargets<'a> {
    pub size: &'a mut dyn ReportSink,
    pub partition: &'a mut dyn ReportSink,
    pub enricher: &'a dyn PartitionEnricher,
}

/// Wall-clock time per phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    pub registry: Duration,
    pub classify: Duration,
    pub sanity: Duration,
    pub reports: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.registry + self.classify + self.sanity + self.reports
    }
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub registry: Registry,
    pub classification: Classification,
    pub sanity: SanityReport,
    pub size_rows: usize,
    pub partition_rows: usize,
    pub stray: Vec<StrayLabel>,
    pub timings: PhaseTimings,
}

/// Reports regenerated from a saved classification
#[derive(Debug)]
pub struct ReportOutcome {
    pub registry: Registry,
    pub classification: Classification,
    pub size_rows: usize,
    pub partition_rows: usize,
    pub stray: Vec<StrayLabel>,
}

fn build_registry<T: TemplateSource + ?Sized>(source: &T) -> Result<(Registry, Duration), AnalysisError> {
    let started = Instant::now();
    let registry = Registry::build(source.list_key_templates()?);
    let elapsed = started.elapsed();
    info!(
        templates = registry.len(),
        partition_token = registry.partition_token().unwrap_or("-"),
        elapsed_ms = elapsed.as_millis() as u64,
        "Built template registry"
    );
    Ok((registry, elapsed))
}

/// Write both reports and summarize the unregistered group
fn write_reports(
    registry: &Registry,
    classification: &Classification,
    targets: ReportTargets<'_>,
) -> Result<(usize, usize, Vec<StrayLabel>, Duration), AnalysisError> {
    let started = Instant::now();
    let size_rows = write_size_report(classification, targets.size)?;
    let partition_rows =
        write_partition_report(registry, classification, targets.enricher, targets.partition)?;
    let elapsed = started.elapsed();
    info!(
        size_rows,
        partition_rows,
        elapsed_ms = elapsed.as_millis() as u64,
        "Wrote reports"
    );

    let stray = summarize_stray_keys(classification);
    for label in stray.iter().take(10) {
        info!(label = %label.label, count = label.count, "Unregistered keys");
    }
    Ok((size_rows, partition_rows, stray, elapsed))
}

/// Rebuild both reports from a snapshot written by a previous run,
/// against the templates currently in `source`
pub fn report_from_snapshot<T: TemplateSource + ?Sized>(
    snapshot: &Path,
    source: &T,
    targets: ReportTargets<'_>,
) -> Result<ReportOutcome, AnalysisError> {
    let (registry, _) = build_registry(source)?;
    let classification = load_snapshot(snapshot)?;
    info!(
        path = %snapshot.display(),
        keys = classification.processed,
        "Loaded classification snapshot"
    );

    let (size_rows, partition_rows, stray, _) = write_reports(&registry, &classification, targets)?;
    Ok(ReportOutcome {
        registry,
        classification,
        size_rows,
        partition_rows,
        stray,
    })
}

/// Run a full analysis of `store` against the templates from `source`
pub fn run_analysis<S, T>(
    options: &AnalysisOptions,
    store: &S,
    source: &T,
    targets: ReportTargets<'_>,
) -> Result<AnalysisOutcome, AnalysisError>
where
    S: StoreReader + Sync + ?Sized,
    T: TemplateSource + ?Sized,
{
    let mut timings = PhaseTimings::default();

    let (registry, elapsed) = build_registry(source)?;
    timings.registry = elapsed;

    let started = Instant::now();
    let classification =
        KeyspaceClassifier::new(&registry, options.classifier.clone()).run(store)?;
    timings.classify = started.elapsed();

    let started = Instant::now();
    let mut report = sanity::check(store, &classification)?;
    if options.strict_sanity {
        report = report.into_result()?;
    }
    timings.sanity = started.elapsed();

    let (size_rows, partition_rows, stray, elapsed) =
        write_reports(&registry, &classification, targets)?;
    timings.reports = elapsed;

    info!(
        keys = classification.processed,
        total_size = classification.total_size(),
        elapsed_ms = timings.total().as_millis() as u64,
        "Analysis complete"
    );

    Ok(AnalysisOutcome {
        registry,
        classification,
        sanity: report,
        size_rows,
        partition_rows,
        stray,
        timings,
    })
}
