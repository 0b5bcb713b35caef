//! Recursive directory walker.
//!
//! Entries are visited in the order the directory enumeration yields them
//! (unsorted), depth first: a subdirectory's record is written before its
//! contents. For every entry the anomaly check runs before its record is
//! appended.
//!
//! Failure policy:
//! - a directory that cannot be opened is reported and skipped; entries
//!   already written and siblings are unaffected;
//! - an entry whose metadata cannot be read is reported and the rest of its
//!   directory level is abandoned;
//! - a snapshot write failure aborts the whole walk.

use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::anomaly::{check_entry, AnomalyHandler, Disposition};
use crate::error::Result;
use crate::metadata::MetadataRecord;
use crate::snapshot::SnapshotWriter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub records: usize,
    pub anomalies: usize,
    pub corrupted: usize,
    pub unanalyzed: usize,
    pub unreadable_dirs: usize,
    pub abandoned_levels: usize,
}

impl WalkStats {
    fn count(&mut self, disposition: &Disposition) {
        self.anomalies += 1;
        if disposition.is_unsafe() {
            self.corrupted += 1;
        }
        if *disposition == Disposition::Unanalyzed {
            self.unanalyzed += 1;
        }
    }
}

pub fn walk_root(
    root: &Path,
    writer: &mut SnapshotWriter,
    handler: &mut dyn AnomalyHandler,
) -> Result<WalkStats> {
    let mut stats = WalkStats::default();
    let mut it = WalkDir::new(root).min_depth(1).follow_links(false).into_iter();

    while let Some(next) = it.next() {
        let entry = match next {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(root).display().to_string();
                warn!(path = %path, error = %e, "failed to open directory");
                stats.unreadable_dirs += 1;
                continue;
            }
        };

        let record = match MetadataRecord::capture(entry.path()) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "failed to read entry metadata, abandoning rest of directory"
                );
                stats.abandoned_levels += 1;
                // A directory entry is already on the walk stack; pop it
                // before popping its parent level.
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                it.skip_current_dir();
                continue;
            }
        };

        let disposition = check_entry(&record, handler);
        if let Some(d) = &disposition {
            stats.count(d);
        }

        writer.append(&record)?;
        stats.records += 1;

        if record.is_dir && disposition.as_ref().is_some_and(Disposition::relocated) {
            debug!(path = %record.path.display(), "directory relocated, not descending");
            it.skip_current_dir();
        }
    }

    Ok(stats)
}
