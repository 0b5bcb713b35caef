//! Quarantine zone – entries the analyzer classified as unsafe are moved here
//! under their base name. Nothing is deduplicated: a later entry with the same
//! name replaces an earlier one.
//!
//! Layout: {quarantine_dir}/{original_filename}

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use dirguard_core::MonitorError;

pub struct QuarantineZone {
    root: PathBuf,
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

impl QuarantineZone {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).with_context(|| format!("create quarantine dir {}", root.display()))?;
        #[cfg(unix)]
        {
            let _ = set_mode(&root, 0o700);
        }
        Ok(Self { root })
    }

    pub fn destination_for(&self, source: &Path) -> PathBuf {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        self.root.join(filename)
    }

    /// Move `source` into quarantine and return where it landed.
    pub fn relocate(&self, source: &Path) -> std::result::Result<PathBuf, MonitorError> {
        let dest = self.destination_for(source);

        match fs::rename(source, &dest) {
            Ok(()) => {
                info!(
                    from = %source.display(),
                    to = %dest.display(),
                    "entry quarantined (moved)"
                );
                Ok(dest)
            }
            Err(e) if is_cross_device(&e) => {
                warn!(error = %e, "rename to quarantine crosses filesystems, trying copy");
                self.copy_then_remove(source, &dest)?;
                info!(
                    from = %source.display(),
                    to = %dest.display(),
                    "entry quarantined (copied)"
                );
                Ok(dest)
            }
            Err(e) => Err(MonitorError::io(source, e)),
        }
    }

    /// Cross-filesystem fallback for regular files. The suspect has no rights,
    /// so it is made owner-readable for the copy and both sides end with none.
    fn copy_then_remove(&self, source: &Path, dest: &Path) -> std::result::Result<(), MonitorError> {
        let meta = fs::symlink_metadata(source).map_err(|e| MonitorError::io(source, e))?;
        if !meta.file_type().is_file() {
            return Err(MonitorError::CrossDevice(source.to_path_buf()));
        }

        set_mode(source, 0o400).map_err(|e| MonitorError::io(source, e))?;
        let copied = fs::copy(source, dest);
        let _ = set_mode(source, 0);
        copied.map_err(|e| MonitorError::io(dest, e))?;

        set_mode(dest, 0).map_err(|e| MonitorError::io(dest, e))?;
        fs::remove_file(source).map_err(|e| MonitorError::io(source, e))?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
