//! External analyzer runner.
//!
//! The analyzer is an opaque executable called with the suspect path as its
//! only argument. Exit status 0 means safe; anything else (including a
//! signal, or being killed on timeout) means unsafe.
//!
//! The suspect has no access rights at all when it reaches us. It is made
//! owner-readable for the duration of the analysis and reset to no rights
//! afterwards, whatever the outcome.

use serde::Serialize;
use std::fs::Permissions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use dirguard_core::metadata::AccessMask;
use dirguard_core::settings::AnalyzerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Safe,
    Unsafe,
}

impl Verdict {
    /// Zero is safe; any non-zero status or a missing one (signal) is unsafe.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Verdict::Safe,
            _ => Verdict::Unsafe,
        }
    }
}

/// The single message sent back from an analysis task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    /// `None` when the analyzer could not be started.
    pub verdict: Option<Verdict>,
    pub exit_code: Option<i32>,
    pub diagnostic: Option<String>,
}

impl AnalysisReport {
    fn unanalyzed(diagnostic: String) -> Self {
        Self {
            verdict: None,
            exit_code: None,
            diagnostic: Some(diagnostic),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    program: PathBuf,
    timeout: Duration,
}

// Called inline on the runtime, never via the blocking pool: root workers
// hold blocking threads while they wait on the verdict of this task.
#[cfg(unix)]
fn set_access(path: &Path, mask: AccessMask) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, Permissions::from_mode(mask.bits()))
}

#[cfg(not(unix))]
fn set_access(path: &Path, mask: AccessMask) -> std::io::Result<()> {
    let mut perms: Permissions = std::fs::symlink_metadata(path)?.permissions();
    perms.set_readonly(mask.is_empty());
    std::fs::set_permissions(path, perms)
}

impl Analyzer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &AnalyzerSettings) -> Self {
        Self::new(settings.program.clone(), settings.timeout())
    }

    /// Analyze one suspect entry.
    pub async fn analyze(&self, suspect: &Path) -> AnalysisReport {
        if let Err(e) = set_access(suspect, AccessMask::OWNER_READ) {
            warn!(path = %suspect.display(), error = %e, "could not grant read access for analysis");
        }

        let report = self.run(suspect).await;

        if let Err(e) = set_access(suspect, AccessMask::NONE) {
            error!(path = %suspect.display(), error = %e, "could not reset access rights after analysis");
        }
        report
    }

    async fn run(&self, suspect: &Path) -> AnalysisReport {
        let mut child = match Command::new(&self.program)
            .arg(suspect)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                error!(
                    program = %self.program.display(),
                    error = %e,
                    "failed to start analyzer"
                );
                return AnalysisReport::unanalyzed(format!(
                    "failed to start {}: {e}",
                    self.program.display()
                ));
            }
        };
        debug!(pid = ?child.id(), path = %suspect.display(), "analyzer started");

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let verdict = Verdict::from_exit_code(status.code());
                AnalysisReport {
                    verdict: Some(verdict),
                    exit_code: status.code(),
                    diagnostic: None,
                }
            }
            Ok(Err(e)) => {
                error!(path = %suspect.display(), error = %e, "waiting on analyzer failed");
                AnalysisReport {
                    verdict: Some(Verdict::Unsafe),
                    exit_code: None,
                    diagnostic: Some(format!("wait failed: {e}")),
                }
            }
            Err(_) => {
                warn!(
                    path = %suspect.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "analyzer timed out, killing it"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill analyzer");
                }
                AnalysisReport {
                    verdict: Some(Verdict::Unsafe),
                    exit_code: None,
                    diagnostic: Some(format!("timed out after {}s", self.timeout.as_secs())),
                }
            }
        }
    }
}

/// Hands suspects to analysis tasks on the runtime and gives each caller a
/// one-shot channel for its verdict. Concurrency is bounded across all
/// callers.
#[derive(Clone)]
pub struct AnalysisDispatcher {
    runtime: Handle,
    analyzer: Arc<Analyzer>,
    permits: Arc<Semaphore>,
}

impl AnalysisDispatcher {
    pub fn new(runtime: Handle, analyzer: Analyzer, max_concurrent: usize) -> Self {
        Self {
            runtime,
            analyzer: Arc::new(analyzer),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn submit(&self, suspect: PathBuf) -> oneshot::Receiver<AnalysisReport> {
        let (tx, rx) = oneshot::channel();
        let analyzer = self.analyzer.clone();
        let permits = self.permits.clone();
        self.runtime.spawn(async move {
            let report = match permits.acquire_owned().await {
                Ok(_permit) => analyzer.analyze(&suspect).await,
                Err(_) => AnalysisReport::unanalyzed("analysis pool closed".into()),
            };
            info!(
                path = %suspect.display(),
                verdict = ?report.verdict,
                exit_code = ?report.exit_code,
                "analysis finished"
            );
            let _ = tx.send(report);
        });
        rx
    }

    /// Submit and block the calling thread until the verdict arrives. Must not
    /// be called from inside an async task.
    pub fn analyze_blocking(&self, suspect: PathBuf) -> AnalysisReport {
        match self.submit(suspect).blocking_recv() {
            Ok(report) => report,
            Err(_) => AnalysisReport::unanalyzed("analysis task ended without a verdict".into()),
        }
    }
}
