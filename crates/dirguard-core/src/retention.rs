//! Snapshot retention and comparison.
//!
//! At most one retained snapshot exists per monitored root, found by the
//! `{root}_Snapshot_` filename prefix in the output directory. A new snapshot
//! either becomes the retained one (first run), is discarded (identical), or
//! replaces it under the retained file's name (different).

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{MonitorError, Result};
use crate::snapshot::{snapshot_prefix, Snapshot};

/// Block size of the chunked comparison.
pub const CHUNK_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Lockstep fixed-size block comparison of the raw bytes.
    #[default]
    Chunked,
    /// Record blocks compared as a multiset, ignoring enumeration order.
    Records,
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chunked" => Ok(CompareMode::Chunked),
            "records" => Ok(CompareMode::Records),
            other => Err(format!("unknown compare mode '{other}' (expected chunked or records)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetentionOutcome {
    /// No previous snapshot; the new one is now retained.
    Promoted { retained: PathBuf },
    /// Identical to the retained snapshot; the new one was deleted.
    Unchanged { retained: PathBuf },
    /// Different; the retained snapshot was replaced by the new one.
    Replaced { retained: PathBuf },
}

impl RetentionOutcome {
    pub fn retained(&self) -> &Path {
        match self {
            RetentionOutcome::Promoted { retained }
            | RetentionOutcome::Unchanged { retained }
            | RetentionOutcome::Replaced { retained } => retained,
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of data.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Chunked comparison: read both sources in `CHUNK_SIZE` blocks and stop at
/// the first block pair differing in length or content.
pub fn chunks_differ<A: Read, B: Read>(mut current: A, mut previous: B) -> io::Result<bool> {
    let mut cur = [0u8; CHUNK_SIZE];
    let mut prev = [0u8; CHUNK_SIZE];
    loop {
        let n_cur = read_chunk(&mut current, &mut cur)?;
        let n_prev = read_chunk(&mut previous, &mut prev)?;
        if n_cur != n_prev || cur[..n_cur] != prev[..n_prev] {
            return Ok(true);
        }
        if n_cur == 0 {
            return Ok(false);
        }
    }
}

fn record_blocks<R: Read>(reader: R) -> io::Result<Vec<String>> {
    let mut blocks = Vec::new();
    let mut block = String::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.is_empty() {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
        } else {
            block.push_str(&line);
            block.push('\n');
        }
    }
    if !block.is_empty() {
        blocks.push(block);
    }
    blocks.sort();
    Ok(blocks)
}

/// Record comparison: same set of record blocks regardless of order.
pub fn records_differ<A: Read, B: Read>(current: A, previous: B) -> io::Result<bool> {
    Ok(record_blocks(current)? != record_blocks(previous)?)
}

pub fn snapshots_differ(current: &Path, previous: &Path, mode: CompareMode) -> Result<bool> {
    let cur = File::open(current).map_err(|e| MonitorError::io(current, e))?;
    let prev = File::open(previous).map_err(|e| MonitorError::io(previous, e))?;
    let differ = match mode {
        CompareMode::Chunked => chunks_differ(cur, prev),
        CompareMode::Records => records_differ(cur, prev),
    };
    differ.map_err(|e| MonitorError::io(current, e))
}

pub struct SnapshotStore {
    output_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Snapshot files for `root_name` other than `exclude`, sorted by name.
    pub fn candidates(&self, root_name: &str, exclude: &Path) -> Result<Vec<PathBuf>> {
        let prefix = snapshot_prefix(root_name);
        let dir = fs::read_dir(&self.output_dir).map_err(|e| MonitorError::io(&self.output_dir, e))?;
        let mut found = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| MonitorError::io(&self.output_dir, e))?;
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            if path != exclude {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Compare `snapshot` with the retained snapshot of its root and update
    /// retention state.
    pub fn reconcile(&self, snapshot: &Snapshot, mode: CompareMode) -> Result<RetentionOutcome> {
        let mut candidates = self.candidates(&snapshot.root_name, &snapshot.path)?.into_iter();
        let Some(previous) = candidates.next() else {
            info!(root = %snapshot.root_name, "no previous snapshot, retaining current one");
            return Ok(RetentionOutcome::Promoted {
                retained: snapshot.path.clone(),
            });
        };

        for stale in candidates {
            warn!(path = %stale.display(), "removing stale snapshot");
            if let Err(e) = fs::remove_file(&stale) {
                warn!(path = %stale.display(), error = %e, "failed to remove stale snapshot");
            }
        }

        if snapshots_differ(&snapshot.path, &previous, mode)? {
            info!(
                root = %snapshot.root_name,
                retained = %previous.display(),
                "difference found, replacing previous snapshot"
            );
            fs::remove_file(&previous).map_err(|e| MonitorError::io(&previous, e))?;
            fs::rename(&snapshot.path, &previous).map_err(|e| MonitorError::io(&snapshot.path, e))?;
            Ok(RetentionOutcome::Replaced { retained: previous })
        } else {
            info!(root = %snapshot.root_name, "no differences from previous snapshot");
            fs::remove_file(&snapshot.path).map_err(|e| MonitorError::io(&snapshot.path, e))?;
            Ok(RetentionOutcome::Unchanged { retained: previous })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot_at(dir: &Path, name: &str, body: &str) -> Snapshot {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        Snapshot {
            path,
            root_name: "A".into(),
            records: 0,
        }
    }

    #[test]
    fn test_chunks_identical_and_empty() {
        let data = vec![b'x'; CHUNK_SIZE * 3 + 17];
        assert!(!chunks_differ(&data[..], &data[..]).unwrap());
        assert!(!chunks_differ(&b""[..], &b""[..]).unwrap());
    }

    #[test]
    fn test_chunks_detect_late_and_length_differences() {
        let a = vec![b'x'; CHUNK_SIZE * 2];
        let mut b = a.clone();
        b[CHUNK_SIZE * 2 - 1] = b'y';
        assert!(chunks_differ(&a[..], &b[..]).unwrap());

        // One side is a strict prefix ending on a chunk boundary.
        let longer = vec![b'x'; CHUNK_SIZE * 2 + 1];
        assert!(chunks_differ(&a[..], &longer[..]).unwrap());
        assert!(chunks_differ(&longer[..], &a[..]).unwrap());
    }

    #[test]
    fn test_records_ignore_order() {
        let a = "Path: /a\nSize: 1 bytes\n\nPath: /b\nSize: 2 bytes\n\n";
        let b = "Path: /b\nSize: 2 bytes\n\nPath: /a\nSize: 1 bytes\n\n";
        assert!(!records_differ(a.as_bytes(), b.as_bytes()).unwrap());
        assert!(chunks_differ(a.as_bytes(), b.as_bytes()).unwrap());

        let c = "Path: /a\nSize: 9 bytes\n\nPath: /b\nSize: 2 bytes\n\n";
        assert!(records_differ(a.as_bytes(), c.as_bytes()).unwrap());
    }

    #[test]
    fn test_compare_mode_parse() {
        assert_eq!("chunked".parse::<CompareMode>().unwrap(), CompareMode::Chunked);
        assert_eq!("Records".parse::<CompareMode>().unwrap(), CompareMode::Records);
        assert!("lines".parse::<CompareMode>().is_err());
    }

    #[test]
    fn test_first_snapshot_is_promoted() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let s1 = snapshot_at(dir.path(), "A_Snapshot_2024.01.01_00:00:00.txt", "one");
        snapshot_at(dir.path(), "AB_Snapshot_2024.01.01_00:00:00.txt", "other root");

        let outcome = store.reconcile(&s1, CompareMode::Chunked).unwrap();
        assert_eq!(outcome, RetentionOutcome::Promoted { retained: s1.path.clone() });
        assert!(s1.path.exists());
    }

    #[test]
    fn test_identical_snapshot_is_discarded() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let s1 = snapshot_at(dir.path(), "A_Snapshot_2024.01.01_00:00:00.txt", "same");
        let s2 = snapshot_at(dir.path(), "A_Snapshot_2024.01.02_00:00:00.txt", "same");

        let outcome = store.reconcile(&s2, CompareMode::Chunked).unwrap();
        assert_eq!(outcome, RetentionOutcome::Unchanged { retained: s1.path.clone() });
        assert!(s1.path.exists());
        assert!(!s2.path.exists());
    }

    #[test]
    fn test_different_snapshot_takes_retained_slot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let s1 = snapshot_at(dir.path(), "A_Snapshot_2024.01.01_00:00:00.txt", "old");
        let s2 = snapshot_at(dir.path(), "A_Snapshot_2024.01.02_00:00:00.txt", "new");

        let outcome = store.reconcile(&s2, CompareMode::Chunked).unwrap();
        assert_eq!(outcome, RetentionOutcome::Replaced { retained: s1.path.clone() });
        assert_eq!(fs::read_to_string(&s1.path).unwrap(), "new");
        assert!(!s2.path.exists());
    }

    #[test]
    fn test_stale_snapshots_are_removed() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let s1 = snapshot_at(dir.path(), "A_Snapshot_2024.01.01_00:00:00.txt", "same");
        let stale = snapshot_at(dir.path(), "A_Snapshot_2024.01.01_12:00:00.txt", "partial");
        let s3 = snapshot_at(dir.path(), "A_Snapshot_2024.01.02_00:00:00.txt", "same");

        store.reconcile(&s3, CompareMode::Chunked).unwrap();
        assert!(!stale.path.exists());
        let left = store.candidates("A", Path::new("")).unwrap();
        assert_eq!(left, vec![s1.path]);
    }
}
