mod bootstrap;
mod scan;

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use processor_core::diagnostics::DiagnosticLevel;
use processor_core::settings::{EnvironmentMapping, Settings};
use processor_runtime::pipeline::{run_batch, BatchReport, GroupOutcome};

fn main() -> Result<ExitCode> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("vCenter processor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Input: {}, Output: {}, Segregation: {}",
        settings.input_dir.display(),
        settings.output_dir.display(),
        !settings.no_segregation
    );

    let mapping = EnvironmentMapping::resolve(settings.mapping_file.as_deref())
        .context("failed to load environment mapping")?;
    tracing::info!("Loaded {} environment mapping entries", mapping.len());

    let scan = scan::collect_batch(&settings.input_dir, settings.max_file_size_bytes())?;
    tracing::info!(
        "Found {} input files ({} skipped)",
        scan.files.len(),
        scan.skipped.len()
    );

    let started_at = Utc::now().trunc_subsecs(0);
    let report = run_batch(
        scan.files,
        &mapping,
        &settings.processing_options(),
        started_at,
    )
    .context("batch aborted")?;

    log_report(&report);

    if report.has_group_failures() {
        tracing::error!(
            "{} group(s) failed to export",
            report.failed_groups().count()
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn log_report(report: &BatchReport) {
    for diagnostic in &report.diagnostics {
        match diagnostic.level {
            DiagnosticLevel::Warning => tracing::warn!("{}", diagnostic),
            DiagnosticLevel::Error => tracing::error!("{}", diagnostic),
        }
    }

    for group in &report.groups {
        match &group.outcome {
            GroupOutcome::Exported { files } => {
                tracing::info!(
                    "{}/{}: {} VMs, {} alarms -> {} files",
                    group.client,
                    group.environment,
                    group.vm_count,
                    group.alarm_count,
                    files.len()
                );
                for file in files {
                    tracing::debug!("  {}", file.display());
                }
            }
            GroupOutcome::Failed { error } => {
                tracing::error!("{}/{}: export failed: {}", group.client, group.environment, error);
            }
        }
    }

    if let Some(summary) = &report.summary_file {
        tracing::info!("Summary written to {}", summary.display());
    }
    tracing::info!(
        "Processed {} files ({} failed): {} VMs, {} alarms",
        report.files.len(),
        report.failed_files().count(),
        report.total_vms(),
        report.total_alarms()
    );
}
