use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dirguard_core::retention::{CompareMode, RetentionOutcome};
use dirguard_core::settings::MonitorSettings;
use dirguard_service::engine::{Engine, RunSummary};

#[derive(Parser, Debug)]
#[command(author, version, about = "Directory integrity monitor", long_about = None)]
struct Cli {
    /// Directory where snapshots are stored
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
    /// Directory where unsafe entries are moved
    #[arg(short = 's', long = "isolated")]
    isolated: Option<PathBuf>,
    /// Executable that classifies a suspect file (exit 0 = safe)
    #[arg(long)]
    analyzer: Option<PathBuf>,
    /// Seconds before a running analyzer is killed
    #[arg(long)]
    analyzer_timeout: Option<u64>,
    /// Maximum analyses running at once
    #[arg(long)]
    max_analyses: Option<usize>,
    /// Snapshot comparison: chunked or records
    #[arg(long)]
    compare: Option<CompareMode>,
    /// JSON settings file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
    /// Directories to monitor
    #[arg(required = true)]
    roots: Vec<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<MonitorSettings> {
        let mut settings = match &self.config {
            Some(path) => MonitorSettings::load(path)
                .with_context(|| format!("load settings from {}", path.display()))?,
            None => MonitorSettings::default(),
        };
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
        if let Some(isolated) = &self.isolated {
            settings.quarantine_dir = isolated.clone();
        }
        if let Some(program) = &self.analyzer {
            settings.analyzer.program = program.clone();
        }
        if let Some(secs) = self.analyzer_timeout {
            settings.analyzer.timeout_secs = secs;
        }
        if let Some(n) = self.max_analyses {
            settings.analyzer.max_concurrent = n;
        }
        if let Some(mode) = self.compare {
            settings.compare_mode = mode;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = cli.settings()?;
    let engine = Engine::new(settings, Handle::current())?;
    info!(
        output = %engine.settings().output_dir.display(),
        quarantine = %engine.settings().quarantine_dir.display(),
        "monitoring {} root(s)",
        cli.roots.len()
    );

    let summary = engine.run(cli.roots.clone()).await;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.roots {
        let status = match (&report.error, &report.retention) {
            (Some(err), _) => format!("error: {err}"),
            (None, Some(RetentionOutcome::Promoted { .. })) => "first snapshot retained".to_string(),
            (None, Some(RetentionOutcome::Unchanged { .. })) => "no changes".to_string(),
            (None, Some(RetentionOutcome::Replaced { .. })) => "changes detected, snapshot replaced".to_string(),
            (None, None) => "incomplete".to_string(),
        };
        println!(
            "[{}] {}: {} entries, {} with potential danger, {}",
            report.index, report.root_name, report.records, report.corrupted, status
        );
    }
    println!(
        "{} root(s), {} entries, {} without access rights, {} unsafe, {} failed",
        summary.roots.len(),
        summary.total_records,
        summary.total_anomalies,
        summary.total_corrupted,
        summary.failed_roots
    );
}
