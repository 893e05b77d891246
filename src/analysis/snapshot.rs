//! Classification snapshots
//!
//! A full scan of a large store takes a long time. Saving the
//! classification lets reports be regenerated (for example with a different
//! partition enricher) without scanning again.

use super::classifier::Classification;
use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    classification: &'a Classification,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    classification: Classification,
}

/// Write `classification` to `path` as JSON
pub fn save_snapshot(path: &Path, classification: &Classification) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        classification,
    };
    serde_json::to_writer(&mut writer, &snapshot)?;
    writer.flush()?;
    info!(path = %path.display(), keys = classification.processed, "Saved snapshot");
    Ok(())
}

/// Read a classification written by [`save_snapshot`]
pub fn load_snapshot(path: &Path) -> Result<Classification, ReportError> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = serde_json::from_reader(reader)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(ReportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            ),
        )));
    }
    Ok(snapshot.classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::registry::GroupId;
    use crate::templates::KeyTemplate;

    #[test]
    fn test_snapshot_preserves_classification() {
        let mut c = Classification::new(true);
        c.record(
            GroupId::Registered(KeyTemplate::new("orders:ACCOUNT_ID")),
            "orders:1",
            Some(12),
        );
        c.record(GroupId::Unregistered, "junk", Some(3));
        c.size_failures = 1;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        save_snapshot(&path, &c).unwrap();

        assert_eq!(load_snapshot(&path).unwrap(), c);
    }

    #[test]
    fn test_group_names_are_readable_in_json() {
        let mut c = Classification::new(false);
        c.record(GroupId::Unregistered, "junk", None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        save_snapshot(&path, &c).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"unregistered\""));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"version":99,"classification":{"groups":{},"key_sizes":{},"processed":0,"size_failures":0,"sizes_estimated":false}}"#,
        )
        .unwrap();
        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn test_rejects_unknown_group_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"version":1,"classification":{"groups":{"orders:ACCOUNT_ID":{"keys":["orders:1"],"size":0},"unregistered":{"keys":["junk"],"size":0}},"key_sizes":{},"processed":2,"size_failures":0,"sizes_estimated":false}}"#,
        )
        .unwrap();

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(err, ReportError::Json(_)));
        assert!(err.to_string().contains("unknown group name"));
    }
}
