//! One monitored root: walk, snapshot, quarantine, then retention.
//!
//! Runs on a blocking thread. Anomalous entries are analyzed on the runtime
//! and this thread waits for each verdict before writing the entry's record.

use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

use dirguard_core::anomaly::{AnomalyHandler, Disposition};
use dirguard_core::metadata::MetadataRecord;
use dirguard_core::retention::{RetentionOutcome, SnapshotStore};
use dirguard_core::settings::MonitorSettings;
use dirguard_core::snapshot::{root_name, SnapshotWriter};
use dirguard_core::walker::walk_root;
use dirguard_core::MonitorError;

use crate::enforcement::analyzer::{AnalysisDispatcher, Verdict};
use crate::enforcement::quarantine::QuarantineZone;

/// Everything one root worker did, returned to the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RootReport {
    pub index: usize,
    pub root: PathBuf,
    pub root_name: String,
    pub records: usize,
    pub anomalies: usize,
    pub corrupted: usize,
    pub unanalyzed: usize,
    pub quarantined: Vec<PathBuf>,
    pub retention: Option<RetentionOutcome>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl RootReport {
    pub fn new(index: usize, root: PathBuf) -> Self {
        Self {
            index,
            root_name: root_name(&root),
            root,
            ..Default::default()
        }
    }

    pub fn failed(index: usize, root: PathBuf, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(index, root)
        }
    }
}

/// Anomaly handler that analyzes suspects and quarantines unsafe ones.
struct QuarantineHandler<'a> {
    root_index: usize,
    dispatcher: &'a AnalysisDispatcher,
    zone: &'a QuarantineZone,
    analyses: usize,
    quarantined: Vec<PathBuf>,
}

impl AnomalyHandler for QuarantineHandler<'_> {
    fn on_anomaly(&mut self, record: &MetadataRecord) -> Disposition {
        self.analyses += 1;
        let worker = format!("{}.{}", self.root_index, self.analyses);
        info!(
            entry = %record.file_name(),
            worker = %worker,
            "entry has no access rights, analyzing"
        );

        let report = self.dispatcher.analyze_blocking(record.path.clone());
        let disposition = match report.verdict {
            None => {
                warn!(
                    entry = %record.file_name(),
                    diagnostic = report.diagnostic.as_deref().unwrap_or(""),
                    "entry left unanalyzed"
                );
                Disposition::Unanalyzed
            }
            Some(Verdict::Safe) => {
                info!(entry = %record.file_name(), "entry is safe");
                Disposition::Safe
            }
            Some(Verdict::Unsafe) => {
                info!(
                    entry = %record.file_name(),
                    exit_code = ?report.exit_code,
                    diagnostic = report.diagnostic.as_deref().unwrap_or(""),
                    "entry is malicious or corrupted, moving it to quarantine"
                );
                match self.zone.relocate(&record.path) {
                    Ok(dest) => {
                        self.quarantined.push(dest.clone());
                        Disposition::Quarantined(dest)
                    }
                    Err(e) => {
                        error!(path = %record.path.display(), error = %e, "quarantine failed");
                        Disposition::QuarantineFailed
                    }
                }
            }
        };
        info!(worker = %worker, outcome = ?disposition, "analysis worker terminated");
        disposition
    }
}

pub struct RootWorker {
    pub index: usize,
    pub root: PathBuf,
    pub settings: Arc<MonitorSettings>,
    pub dispatcher: AnalysisDispatcher,
    pub zone: Arc<QuarantineZone>,
}

impl RootWorker {
    pub fn run(self) -> RootReport {
        let span = info_span!("root", index = self.index, root = %self.root.display());
        let _enter = span.enter();

        let started = Instant::now();
        let mut report = RootReport::new(self.index, self.root.clone());
        if let Err(e) = self.pipeline(&mut report) {
            error!(error = %e, "monitoring aborted for root");
            report.error = Some(e.to_string());
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            corrupted = report.corrupted,
            records = report.records,
            "root worker finished"
        );
        report
    }

    fn pipeline(&self, report: &mut RootReport) -> Result<(), MonitorError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(MonitorError::RootNotFound(self.root.clone())),
        }
        // Snapshots are named after the root as given; records use the
        // resolved path.
        let given = std::path::absolute(&self.root).map_err(|e| MonitorError::io(&self.root, e))?;
        let name = root_name(&given);
        report.root_name = name.clone();
        let root = fs::canonicalize(&self.root).map_err(|e| MonitorError::io(&self.root, e))?;

        let mut writer = SnapshotWriter::create(&self.settings.output_dir, &name, &Local::now())?;
        let snapshot_path = writer.path().to_path_buf();
        let mut handler = QuarantineHandler {
            root_index: self.index,
            dispatcher: &self.dispatcher,
            zone: &self.zone,
            analyses: 0,
            quarantined: Vec::new(),
        };

        let walk_started = Instant::now();
        let walked = match walk_root(&root, &mut writer, &mut handler) {
            Ok(stats) => writer.finish().map(|snapshot| (stats, snapshot)),
            Err(e) => {
                warn!(written = writer.records(), "walk aborted, discarding partial snapshot");
                Err(e)
            }
        };
        report.quarantined = handler.quarantined;
        let (stats, snapshot) = match walked {
            Ok(done) => done,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&snapshot_path) {
                    warn!(path = %snapshot_path.display(), error = %rm, "failed to remove partial snapshot");
                }
                return Err(e);
            }
        };

        report.records = stats.records;
        report.anomalies = stats.anomalies;
        report.corrupted = stats.corrupted;
        report.unanalyzed = stats.unanalyzed;
        info!(
            snapshot = %snapshot.path.display(),
            records = snapshot.records,
            elapsed_secs = walk_started.elapsed().as_secs_f64(),
            "snapshot created"
        );

        let store = SnapshotStore::new(&self.settings.output_dir);
        report.retention = Some(store.reconcile(&snapshot, self.settings.compare_mode)?);
        Ok(())
    }
}
