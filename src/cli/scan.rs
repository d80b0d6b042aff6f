//! Scan command

use super::files::collect_files;
use crate::config::ScanConfig;
use crate::detectors::ScanEngine;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub(super) fn run(
    config: &ScanConfig,
    paths: &[PathBuf],
    output: Option<&Path>,
    fail_on_findings: bool,
) -> Result<i32> {
    let files = collect_files(paths)?;
    info!("Collected {} files", files.len());

    let engine = ScanEngine::from_config(config).context("Failed to prepare scan session")?;
    let names: Vec<&str> = engine.detectors().iter().map(|d| d.name()).collect();
    info!("Detectors: {}", names.join(", "));
    let report = engine.run(&files)?;
    info!("Findings in {} of {} files", report.by_file().len(), files.len());

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if fail_on_findings && !report.findings.is_empty() {
        return Ok(1);
    }
    Ok(0)
}
