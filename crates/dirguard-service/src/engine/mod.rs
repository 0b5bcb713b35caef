//! Root orchestrator.
//!
//! Fans out one blocking worker per monitored root, waits for all of them in
//! whatever order they finish, and aggregates their per-root counters. Roots
//! are independent: one failing never stops the others.

mod root_worker;

pub use root_worker::{RootReport, RootWorker};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{error, info};

use dirguard_core::settings::MonitorSettings;

use crate::enforcement::analyzer::{AnalysisDispatcher, Analyzer};
use crate::enforcement::quarantine::QuarantineZone;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub roots: Vec<RootReport>,
    pub total_records: usize,
    pub total_anomalies: usize,
    pub total_corrupted: usize,
    pub total_unanalyzed: usize,
    pub failed_roots: usize,
}

impl RunSummary {
    fn from_reports(started_at: DateTime<Local>, mut roots: Vec<RootReport>) -> Self {
        roots.sort_by_key(|r| r.index);
        Self {
            started_at,
            total_records: roots.iter().map(|r| r.records).sum(),
            total_anomalies: roots.iter().map(|r| r.anomalies).sum(),
            total_corrupted: roots.iter().map(|r| r.corrupted).sum(),
            total_unanalyzed: roots.iter().map(|r| r.unanalyzed).sum(),
            failed_roots: roots.iter().filter(|r| r.error.is_some()).count(),
            roots,
        }
    }

    #[allow(dead_code)]
    pub fn report_for(&self, index: usize) -> Option<&RootReport> {
        self.roots.iter().find(|r| r.index == index)
    }
}

pub struct Engine {
    settings: Arc<MonitorSettings>,
    dispatcher: AnalysisDispatcher,
    zone: Arc<QuarantineZone>,
}

impl Engine {
    /// Validate settings and create the output and quarantine directories.
    pub fn new(settings: MonitorSettings, runtime: Handle) -> Result<Self> {
        settings.validate()?;
        std::fs::create_dir_all(&settings.output_dir)
            .with_context(|| format!("create output dir {}", settings.output_dir.display()))?;
        let zone = QuarantineZone::new(settings.quarantine_dir.clone())?;
        let dispatcher = AnalysisDispatcher::new(
            runtime,
            Analyzer::from_settings(&settings.analyzer),
            settings.analyzer.max_concurrent,
        );
        Ok(Self {
            settings: Arc::new(settings),
            dispatcher,
            zone: Arc::new(zone),
        })
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Monitor every root once. Root indices are 1-based in argument order.
    pub async fn run(&self, roots: Vec<PathBuf>) -> RunSummary {
        let started_at = Local::now();
        let mut set = JoinSet::new();
        let mut pending = Vec::with_capacity(roots.len());

        for (i, root) in roots.into_iter().enumerate() {
            let worker = RootWorker {
                index: i + 1,
                root: root.clone(),
                settings: self.settings.clone(),
                dispatcher: self.dispatcher.clone(),
                zone: self.zone.clone(),
            };
            pending.push((i + 1, root));
            set.spawn_blocking(move || worker.run());
        }
        info!(roots = pending.len(), "root workers started");

        let mut reports = Vec::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => {
                    info!(
                        index = report.index,
                        root = %report.root_name,
                        corrupted = report.corrupted,
                        ok = report.error.is_none(),
                        "root worker terminated"
                    );
                    reports.push(report);
                }
                Err(e) => error!(error = %e, "root worker did not complete"),
            }
        }

        let finished: HashSet<usize> = reports.iter().map(|r| r.index).collect();
        for (index, root) in pending {
            if !finished.contains(&index) {
                reports.push(RootReport::failed(index, root, "root worker did not complete".into()));
            }
        }

        RunSummary::from_reports(started_at, reports)
    }
}
