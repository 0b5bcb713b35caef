use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::retention::CompareMode;

pub const DEFAULT_ANALYZER: &str = "./verify_for_malicious.sh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on analyses running at once across all roots.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_program() -> PathBuf {
    PathBuf::from(DEFAULT_ANALYZER)
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl AnalyzerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Where snapshots are written and retained.
    #[serde(default)]
    pub output_dir: PathBuf,
    /// Where unsafe entries are moved.
    #[serde(default)]
    pub quarantine_dir: PathBuf,
    #[serde(default)]
    pub analyzer: AnalyzerSettings,
    #[serde(default)]
    pub compare_mode: CompareMode,
}

impl MonitorSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| MonitorError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(MonitorError::Config("output directory not provided (-o)".into()));
        }
        if self.quarantine_dir.as_os_str().is_empty() {
            return Err(MonitorError::Config("quarantine directory not provided (-s)".into()));
        }
        if self.output_dir == self.quarantine_dir {
            return Err(MonitorError::Config(
                "output and quarantine directories must differ".into(),
            ));
        }
        if self.analyzer.timeout_secs == 0 {
            return Err(MonitorError::Config("analyzer timeout must be at least 1s".into()));
        }
        if self.analyzer.max_concurrent == 0 {
            return Err(MonitorError::Config(
                "at least one concurrent analysis is required".into(),
            ));
        }
        Ok(())
    }
}
