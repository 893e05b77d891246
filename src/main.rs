//! keyspace-analysis
//!
//! Scans a Redis keyspace, files every key under its registered template,
//! and writes the size and partition reports. Configured through
//! `ANALYSIS_*` environment variables (see `config`). With
//! `ANALYSIS_FROM_SNAPSHOT` set, the store is not contacted: the reports
//! are rebuilt from a saved classification.

use keyspace_analysis::analysis::save_snapshot;
use keyspace_analysis::{
    report_from_snapshot, run_analysis, AnalysisConfig, AnalysisOptions, CsvSink, LogFormat,
    LookupEnricher, NoEnrichment, PartitionEnricher, ReportTargets, RespStore, TomlTemplates,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Where the classification comes from
enum Input {
    Store(RespStore),
    Snapshot(PathBuf),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AnalysisConfig::from_env()?;
    init_tracing(config.log_format);

    // connect before the report files are truncated
    let input = match &config.from_snapshot {
        Some(path) => Input::Snapshot(path.clone()),
        None => {
            info!(
                store = %config.store_addr,
                db = config.store_db,
                templates = %config.templates_path.display(),
                workers = config.workers,
                estimate_sizes = config.estimate_sizes,
                "Starting keyspace analysis"
            );
            Input::Store(RespStore::connect(config.store_config())?)
        }
    };
    let templates = TomlTemplates::new(&config.templates_path);

    let enricher: Box<dyn PartitionEnricher> = match &config.partition_info_path {
        Some(path) => {
            let lookup = LookupEnricher::from_csv(path)?;
            info!(path = %path.display(), partitions = lookup.len(), "Loaded partition info");
            Box::new(lookup)
        }
        None => Box::new(NoEnrichment),
    };

    std::fs::create_dir_all(&config.output_dir)?;
    let size_path = config.size_report_path();
    let partition_path = config.partition_report_path();
    let mut size_sink = CsvSink::create(&size_path)?;
    let mut partition_sink = CsvSink::create(&partition_path)?;
    let targets = ReportTargets {
        size: &mut size_sink,
        partition: &mut partition_sink,
        enricher: enricher.as_ref(),
    };

    let classification = match input {
        Input::Snapshot(path) => {
            info!(snapshot = %path.display(), "Rebuilding reports from snapshot");
            report_from_snapshot(&path, &templates, targets)?.classification
        }
        Input::Store(store) => {
            let options = AnalysisOptions {
                classifier: config.classifier_config(),
                strict_sanity: config.strict_sanity,
            };
            let outcome = run_analysis(&options, &store, &templates, targets)?;
            if let Some(path) = &config.snapshot_path {
                save_snapshot(path, &outcome.classification)?;
            }
            outcome.classification
        }
    };

    info!(
        size_report = %size_path.display(),
        partition_report = %partition_path.display(),
        keys = classification.processed,
        unregistered = classification.unregistered().map(|g| g.count()).unwrap_or(0),
        "Reports written"
    );
    Ok(())
}
