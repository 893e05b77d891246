//! Report rendering
//!
//! Two reports are produced from a classification, both as a header plus
//! ordered rows handed to a [`ReportSink`]:
//!
//! - **Size report** `[key, count, size]`, one row per group, ascending by
//!   `(count, size, group)`.
//! - **Partition report** `[partition key, partition value, count, size, ...]`,
//!   one row per partition bucket of every registered group. Groups appear
//!   in ascending `(count, group)` order; buckets in the order the
//!   partition aggregator returns them. Extra columns come from a
//!   [`PartitionEnricher`].

mod csv_sink;

pub use csv_sink::{CsvSink, LookupEnricher};

use crate::analysis::{partition_group, Classification, GroupId, Registry};
use crate::error::ReportError;
use std::fmt;
use tracing::debug;

pub const SIZE_REPORT_HEADER: [&str; 3] = ["key", "count", "size"];
pub const PARTITION_REPORT_HEADER: [&str; 4] = ["partition key", "partition value", "count", "size"];

/// One report cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Number(u64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<u64> for Cell {
    fn from(n: u64) -> Self {
        Cell::Number(n)
    }
}

/// Destination for report rows
pub trait ReportSink {
    fn write_header(&mut self, columns: &[String]) -> Result<(), ReportError>;
    fn write_row(&mut self, row: &[Cell]) -> Result<(), ReportError>;
    /// Flush buffered output
    fn finish(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Sink that keeps rows in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows rendered as strings, for assertions and display
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(Cell::to_string).collect())
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn write_header(&mut self, columns: &[String]) -> Result<(), ReportError> {
        self.header = columns.to_vec();
        Ok(())
    }

    fn write_row(&mut self, row: &[Cell]) -> Result<(), ReportError> {
        self.rows.push(row.to_vec());
        Ok(())
    }
}

/// Adds per-partition-value columns to the partition report
pub trait PartitionEnricher {
    /// Names of the extra columns
    fn header(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extra fields for `partition_value`; may be shorter than the header
    fn enrich(&self, _partition_value: &str) -> Vec<Cell> {
        Vec::new()
    }
}

/// Enricher adding nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl PartitionEnricher for NoEnrichment {}

/// One size report row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeRow {
    pub group: GroupId,
    pub count: u64,
    pub size: u64,
}

/// Size report rows in report order
pub fn size_rows(classification: &Classification) -> Vec<SizeRow> {
    let mut rows: Vec<SizeRow> = classification
        .groups
        .iter()
        .map(|(group, members)| SizeRow {
            group: group.clone(),
            count: members.count(),
            size: members.size,
        })
        .collect();
    rows.sort_by(|a, b| {
        (a.count, a.size, &a.group).cmp(&(b.count, b.size, &b.group))
    });
    rows
}

/// Emit the size report; returns the number of data rows
pub fn write_size_report(
    classification: &Classification,
    sink: &mut dyn ReportSink,
) -> Result<usize, ReportError> {
    let header: Vec<String> = SIZE_REPORT_HEADER.iter().map(|s| s.to_string()).collect();
    sink.write_header(&header)?;

    let rows = size_rows(classification);
    for row in &rows {
        sink.write_row(&[
            Cell::from(row.group.display_name()),
            Cell::Number(row.count),
            Cell::Number(row.size),
        ])?;
    }
    sink.finish()?;
    Ok(rows.len())
}

/// Emit the partition report; returns the number of data rows
pub fn write_partition_report(
    registry: &Registry,
    classification: &Classification,
    enricher: &dyn PartitionEnricher,
    sink: &mut dyn ReportSink,
) -> Result<usize, ReportError> {
    let mut header: Vec<String> = PARTITION_REPORT_HEADER.iter().map(|s| s.to_string()).collect();
    header.extend(enricher.header());
    sink.write_header(&header)?;

    let mut groups: Vec<(u64, &GroupId)> = classification
        .groups
        .iter()
        .filter(|(group, _)| matches!(group, GroupId::Registered(_)))
        .map(|(group, members)| (members.count(), group))
        .collect();
    groups.sort();

    let mut written = 0;
    for (_, group) in groups {
        let Some(breakdown) = partition_group(registry, classification, group) else {
            continue;
        };
        debug!(group = %group, partitions = breakdown.buckets.len(), "Writing partition rows");

        for bucket in &breakdown.buckets {
            let size = if classification.sizes_estimated { bucket.size } else { 0 };
            let mut row = vec![
                Cell::from(group.display_name()),
                Cell::from(bucket.value.as_str()),
                Cell::Number(bucket.count),
                Cell::Number(size),
            ];
            row.extend(enricher.enrich(&bucket.value));
            sink.write_row(&row)?;
            written += 1;
        }
    }
    sink.finish()?;
    Ok(written)
}
