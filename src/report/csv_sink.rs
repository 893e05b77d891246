//! CSV output and CSV-backed partition metadata

use super::{Cell, PartitionEnricher, ReportSink};
use crate::error::ReportError;
use ahash::AHashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes report rows as CSV
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        Ok(CsvSink {
            writer: csv::WriterBuilder::new().flexible(true).from_path(path)?,
        })
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W) -> Self {
        CsvSink {
            writer: csv::WriterBuilder::new().flexible(true).from_writer(writer),
        }
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(self) -> Result<W, ReportError> {
        self.writer
            .into_inner()
            .map_err(|e| ReportError::Io(e.into_error()))
    }
}

impl<W: Write> ReportSink for CsvSink<W> {
    fn write_header(&mut self, columns: &[String]) -> Result<(), ReportError> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn write_row(&mut self, row: &[Cell]) -> Result<(), ReportError> {
        self.writer
            .write_record(row.iter().map(|cell| cell.to_string()))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Enricher backed by a table keyed on partition value.
///
/// The CSV source's first column is the partition value; remaining columns
/// become the extra report columns, named by the source's header row.
#[derive(Debug, Clone, Default)]
pub struct LookupEnricher {
    columns: Vec<String>,
    rows: AHashMap<String, Vec<String>>,
}

impl LookupEnricher {
    pub fn new(columns: Vec<String>) -> Self {
        LookupEnricher {
            columns,
            rows: AHashMap::new(),
        }
    }

    pub fn insert(&mut self, partition_value: &str, fields: Vec<String>) {
        self.rows.insert(partition_value.to_string(), fields);
    }

    pub fn from_csv(path: &Path) -> Result<Self, ReportError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, ReportError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let columns = reader
            .headers()?
            .iter()
            .skip(1)
            .map(str::to_string)
            .collect();
        let mut enricher = LookupEnricher::new(columns);
        for record in reader.records() {
            let record = record?;
            let mut fields = record.iter();
            if let Some(value) = fields.next() {
                enricher.insert(value, fields.map(str::to_string).collect());
            }
        }
        Ok(enricher)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl PartitionEnricher for LookupEnricher {
    fn header(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn enrich(&self, partition_value: &str) -> Vec<Cell> {
        self.rows
            .get(partition_value)
            .map(|fields| fields.iter().map(|f| Cell::Text(f.clone())).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_sink_quotes_fields() {
        let mut sink = CsvSink::from_writer(Vec::new());
        sink.write_header(&["key".to_string(), "count".to_string()]).unwrap();
        sink.write_row(&[Cell::from("a,b"), Cell::Number(3)]).unwrap();
        sink.finish().unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "key,count\n\"a,b\",3\n");
    }

    #[test]
    fn test_csv_sink_accepts_ragged_rows() {
        let mut sink = CsvSink::from_writer(Vec::new());
        sink.write_header(&["a".to_string(), "b".to_string(), "c".to_string()]).unwrap();
        sink.write_row(&[Cell::from("x"), Cell::Number(1)]).unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "a,b,c\nx,1\n");
    }

    #[test]
    fn test_csv_sink_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut sink = CsvSink::create(&path).unwrap();
        sink.write_header(&["key".to_string()]).unwrap();
        sink.write_row(&[Cell::from("orders:ID")]).unwrap();
        sink.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "key\norders:ID\n");
    }

    #[test]
    fn test_lookup_enricher_from_csv() {
        let data = "account,name,plan\n42,Acme,gold\n7,Initech,free\n";
        let enricher = LookupEnricher::from_reader(data.as_bytes()).unwrap();

        assert_eq!(enricher.header(), vec!["name", "plan"]);
        assert_eq!(
            enricher.enrich("42"),
            vec![Cell::from("Acme"), Cell::from("gold")]
        );
        assert!(enricher.enrich("missing").is_empty());
        assert_eq!(enricher.len(), 2);
    }
}
