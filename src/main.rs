//! Generate the four single-condition datasets and the combined dataset

use anyhow::{bail, Context, Result};
use stimprep::{run_all, PrepConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PrepConfig::default();
    config.validate().context("invalid configuration")?;

    let report = run_all(&config);

    if let Some(path) = &config.report_path {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    for record in report.succeeded() {
        info!(
            dataset = record.name(),
            path = %record.output().display(),
            train = record.train_samples(),
            test = record.test_samples(),
            "Created"
        );
    }
    for record in report.failed() {
        warn!(
            dataset = record.name(),
            error = record.error().unwrap_or_default(),
            "Failed"
        );
    }

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} of {} datasets failed", report.records().len());
    }
    Ok(())
}
