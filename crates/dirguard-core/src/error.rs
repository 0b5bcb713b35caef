//! Error types shared by the monitor crates.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("monitored root does not exist or is not a directory: {0}")]
    RootNotFound(PathBuf),

    #[error("failed to open snapshot file {path}: {source}")]
    SnapshotCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot file {path}: {source}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot move {0} across filesystems")]
    CrossDevice(PathBuf),
}

impl MonitorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MonitorError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
