//! Per-entry metadata capture.
//!
//! A [`MetadataRecord`] is taken with `lstat` semantics (symlinks are not
//! followed) and is never modified after capture. Its textual form is the
//! block written to snapshot files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};

/// The nine owner/group/other × read/write/execute permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessMask(u16);

impl AccessMask {
    pub const NONE: AccessMask = AccessMask(0);
    pub const OWNER_READ: AccessMask = AccessMask(0o400);

    /// Keep only the permission bits of a raw `st_mode`.
    pub fn from_mode(mode: u32) -> Self {
        AccessMask((mode & 0o777) as u16)
    }

    pub fn bits(self) -> u32 {
        u32::from(self.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `rwx r-x r--` style rendering, one triplet per class.
    pub fn render(self) -> String {
        const FLAGS: [(u16, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        let mut out = String::with_capacity(11);
        for (i, (bit, c)) in FLAGS.iter().enumerate() {
            if i > 0 && i % 3 == 0 {
                out.push(' ');
            }
            out.push(if self.0 & bit != 0 { *c } else { '-' });
        }
        out
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub access: AccessMask,
    pub hard_links: u64,
    /// Not serialized into snapshots; drives recursion only.
    #[serde(skip)]
    pub is_dir: bool,
}

impl MetadataRecord {
    /// Stat `path` without following a trailing symlink.
    pub fn capture(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).map_err(|e| MonitorError::io(path, e))?;
        Ok(Self::from_metadata(path.to_path_buf(), &meta))
    }

    pub fn from_metadata(path: PathBuf, meta: &Metadata) -> Self {
        #[cfg(unix)]
        let (mode, hard_links) = {
            use std::os::unix::fs::MetadataExt;
            (meta.mode(), meta.nlink())
        };
        #[cfg(not(unix))]
        let (mode, hard_links) = {
            let mode = if meta.permissions().readonly() { 0o444 } else { 0o666 };
            (mode, 1u64)
        };

        Self {
            path,
            size_bytes: meta.len(),
            access: AccessMask::from_mode(mode),
            hard_links,
            is_dir: meta.file_type().is_dir(),
        }
    }

    /// The snapshot block for this record, including the terminating blank line.
    pub fn to_block(&self) -> String {
        format!(
            "Path: {}\nSize: {} bytes\nAccess Rights: {}\nHard Links: {}\n\n",
            self.path.display(),
            self.size_bytes,
            self.access,
            self.hard_links
        )
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_render_triplets() {
        assert_eq!(AccessMask::from_mode(0o100644).render(), "rw- r-- r--");
        assert_eq!(AccessMask::from_mode(0o40755).render(), "rwx r-x r-x");
        assert_eq!(AccessMask::NONE.render(), "--- --- ---");
        assert_eq!(AccessMask::OWNER_READ.render(), "r-- --- ---");
    }

    #[test]
    fn test_from_mode_drops_type_and_special_bits() {
        let mask = AccessMask::from_mode(0o104000);
        assert!(mask.is_empty());
        assert_eq!(AccessMask::from_mode(0o1777).bits(), 0o777);
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        File::create(&path).unwrap().write_all(b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let record = MetadataRecord::capture(&path).unwrap();
        assert_eq!(record.size_bytes, 5);
        assert_eq!(record.access.bits(), 0o640);
        assert_eq!(record.hard_links, 1);
        assert!(!record.is_dir);
        assert_eq!(
            record.to_block(),
            format!(
                "Path: {}\nSize: 5 bytes\nAccess Rights: rw- r-- ---\nHard Links: 1\n\n",
                path.display()
            )
        );
    }

    #[test]
    fn test_capture_missing_entry_fails() {
        let dir = tempdir().unwrap();
        let err = MetadataRecord::capture(&dir.path().join("gone")).unwrap_err();
        assert!(matches!(err, MonitorError::Io { .. }));
    }
}
