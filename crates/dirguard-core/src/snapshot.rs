//! Snapshot files.
//!
//! Layout: `{output_dir}/{root_name}_Snapshot_{YYYY.MM.DD_HH:MM:SS}.txt`, one
//! text block per entry, blocks separated by a blank line. Records are written
//! straight to the file as they arrive so a crash leaves a truncated but
//! readable snapshot.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::metadata::MetadataRecord;

/// Token between the root name and the timestamp in every snapshot name.
pub const SNAPSHOT_MARKER: &str = "_Snapshot_";
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d_%H:%M:%S";

/// Filename prefix shared by every snapshot of `root_name`.
pub fn snapshot_prefix(root_name: &str) -> String {
    format!("{root_name}{SNAPSHOT_MARKER}")
}

pub fn snapshot_file_name(root_name: &str, created_at: &DateTime<Local>) -> String {
    format!(
        "{}{}.txt",
        snapshot_prefix(root_name),
        created_at.format(TIMESTAMP_FORMAT)
    )
}

/// Name used for a monitored root in snapshot filenames.
pub fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string())
}

/// A completed snapshot on disk.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub root_name: String,
    pub records: usize,
}

pub struct SnapshotWriter {
    file: File,
    path: PathBuf,
    root_name: String,
    records: usize,
}

impl SnapshotWriter {
    /// Create a fresh snapshot file for `root_name`. A second snapshot in the
    /// same second gets a `_{n}` suffix instead of clobbering the first.
    pub fn create(output_dir: &Path, root_name: &str, created_at: &DateTime<Local>) -> Result<Self> {
        let base = snapshot_file_name(root_name, created_at);
        let stem = base.trim_end_matches(".txt").to_string();
        let mut n = 0u32;
        loop {
            let name = if n == 0 {
                base.clone()
            } else {
                format!("{stem}_{n}.txt")
            };
            let path = output_dir.join(&name);
            let opened = {
                let mut opts = OpenOptions::new();
                opts.write(true).create_new(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt;
                    opts.mode(0o600);
                }
                opts.open(&path)
            };
            match opened {
                Ok(file) => {
                    debug!(path = %path.display(), "snapshot file created");
                    return Ok(Self {
                        file,
                        path,
                        root_name: root_name.to_string(),
                        records: 0,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(source) => return Err(MonitorError::SnapshotCreate { path, source }),
            }
        }
    }

    pub fn append(&mut self, record: &MetadataRecord) -> Result<()> {
        self.file
            .write_all(record.to_block().as_bytes())
            .map_err(|source| MonitorError::SnapshotWrite {
                path: self.path.clone(),
                source,
            })?;
        self.records += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(self) -> Result<Snapshot> {
        self.file
            .sync_all()
            .map_err(|source| MonitorError::SnapshotWrite {
                path: self.path.clone(),
                source,
            })?;
        Ok(Snapshot {
            path: self.path,
            root_name: self.root_name,
            records: self.records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AccessMask;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            snapshot_file_name("docs", &fixed_time()),
            "docs_Snapshot_2024.03.09_07:05:01.txt"
        );
        assert_eq!(snapshot_prefix("docs"), "docs_Snapshot_");
    }

    #[test]
    fn test_root_name() {
        assert_eq!(root_name(Path::new("/srv/data")), "data");
        assert_eq!(root_name(Path::new("/")), "root");
    }

    #[test]
    fn test_writer_appends_blocks() {
        let dir = tempdir().unwrap();
        let mut writer = SnapshotWriter::create(dir.path(), "A", &fixed_time()).unwrap();
        let record = MetadataRecord {
            path: PathBuf::from("/A/f"),
            size_bytes: 3,
            access: AccessMask::from_mode(0o644),
            hard_links: 1,
            is_dir: false,
        };
        writer.append(&record).unwrap();
        writer.append(&record).unwrap();
        let snapshot = writer.finish().unwrap();

        assert_eq!(snapshot.records, 2);
        let text = fs::read_to_string(&snapshot.path).unwrap();
        let block = "Path: /A/f\nSize: 3 bytes\nAccess Rights: rw- r-- r--\nHard Links: 1\n\n";
        assert_eq!(text, format!("{block}{block}"));
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let dir = tempdir().unwrap();
        let first = SnapshotWriter::create(dir.path(), "A", &fixed_time()).unwrap();
        let second = SnapshotWriter::create(dir.path(), "A", &fixed_time()).unwrap();
        assert_ne!(first.path(), second.path());
        let name = second.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, "A_Snapshot_2024.03.09_07:05:01_1.txt");
        assert!(name.starts_with(&snapshot_prefix("A")));
    }

    #[test]
    fn test_missing_output_dir_fails() {
        let dir = tempdir().unwrap();
        let err = SnapshotWriter::create(&dir.path().join("nope"), "A", &fixed_time()).err().unwrap();
        assert!(matches!(err, MonitorError::SnapshotCreate { .. }));
    }
}
