//! One batch, start to finish.
//!
//! The caller hands over the file contents of a batch; the pipeline never
//! touches the input directory itself. Files are processed sequentially,
//! oldest modification time first, so last-write-wins deduplication is
//! deterministic. Only an unusable output directory aborts the batch; every
//! other problem is reported per file or per group.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use processor_core::diagnostics::{Diagnostic, DiagnosticLevel};
use processor_core::error::Result;
use processor_core::models::{EnvironmentContext, InputFormat};
use processor_core::settings::{EnvironmentMapping, ProcessingOptions};
use processor_data::aggregator::DatasetAggregator;
use processor_data::classifier::PathClassifier;
use processor_data::extractor;
use processor_data::normalizer::{NormalizedRecords, Normalizer};
use processor_export::exporter::{Exporter, GroupExport};
use processor_export::summary::BatchSummary;
use serde::Serialize;
use tracing::{error, info, warn};

// ── Inputs ────────────────────────────────────────────────────────────────────

/// One input file of a batch, already read by the caller.
#[derive(Debug, Clone)]
pub struct BatchFile {
    /// Path used for classification and as `source_file`, normally relative
    /// to the scanned input directory.
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub format: InputFormat,
    pub modified_at: DateTime<Utc>,
}

impl BatchFile {
    pub fn new(
        path: impl Into<PathBuf>,
        content: impl Into<Vec<u8>>,
        format: InputFormat,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            format,
            modified_at,
        }
    }

    fn source_name(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processed,
    /// The file could not be parsed and contributed no records.
    Failed,
}

/// Per-file outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub client: String,
    pub environment: String,
    /// `false` when the path matched no mapping entry.
    pub classified: bool,
    pub status: FileStatus,
    pub vms_extracted: usize,
    pub alarms_extracted: usize,
    pub vms_dropped: usize,
    pub alarms_dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GroupOutcome {
    Exported { files: Vec<PathBuf> },
    Failed { error: String },
}

/// Per-group export outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub client: String,
    pub environment: String,
    pub vm_count: usize,
    pub alarm_count: usize,
    pub outcome: GroupOutcome,
}

impl GroupReport {
    pub fn is_exported(&self) -> bool {
        matches!(self.outcome, GroupOutcome::Exported { .. })
    }

    pub fn files(&self) -> &[PathBuf] {
        match &self.outcome {
            GroupOutcome::Exported { files } => files,
            GroupOutcome::Failed { .. } => &[],
        }
    }
}

impl From<GroupExport> for GroupReport {
    fn from(export: GroupExport) -> Self {
        let outcome = match export.result {
            Ok(files) => GroupOutcome::Exported { files },
            Err(e) => GroupOutcome::Failed {
                error: e.to_string(),
            },
        };
        Self {
            client: export.context.client,
            environment: export.context.environment,
            vm_count: export.vm_count,
            alarm_count: export.alarm_count,
            outcome,
        }
    }
}

/// Everything a caller needs to log and act on after a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub groups: Vec<GroupReport>,
    pub diagnostics: Vec<Diagnostic>,
    pub summary_file: Option<PathBuf>,
}

impl BatchReport {
    pub fn failed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.status == FileStatus::Failed)
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups.iter().filter(|g| !g.is_exported())
    }

    /// `true` when at least one group could not be exported.
    pub fn has_group_failures(&self) -> bool {
        self.failed_groups().next().is_some()
    }

    pub fn output_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.groups.iter().flat_map(|g| g.files().iter())
    }

    pub fn total_vms(&self) -> usize {
        self.groups.iter().map(|g| g.vm_count).sum()
    }

    pub fn total_alarms(&self) -> usize {
        self.groups.iter().map(|g| g.alarm_count).sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
    }
}

// ── run_batch ─────────────────────────────────────────────────────────────────

/// Process one batch and export its dataset into `options.output_dir`.
///
/// `started_at` stamps every output file name and every VM's `ingested_at`,
/// so re-running the same batch with the same start time reproduces the
/// same bytes.
///
/// # Errors
/// Returns [`ProcessorError::OutputDirectory`] when the output directory
/// cannot be created or written. Nothing else is batch-fatal.
///
/// [`ProcessorError::OutputDirectory`]: processor_core::error::ProcessorError::OutputDirectory
pub fn run_batch(
    mut files: Vec<BatchFile>,
    mapping: &EnvironmentMapping,
    options: &ProcessingOptions,
    started_at: DateTime<Utc>,
) -> Result<BatchReport> {
    let exporter = Exporter::new(&options.output_dir, started_at);
    exporter.prepare()?;

    info!(
        files = files.len(),
        output = %options.output_dir.display(),
        segregate = options.segregate_by_environment,
        "starting batch"
    );

    // Stable: equal timestamps keep the caller's order.
    files.sort_by_key(|f| f.modified_at);

    let classifier = PathClassifier::new(mapping);
    let mut aggregator = DatasetAggregator::new(options.segregate_by_environment);
    let mut diagnostics = Vec::new();
    let mut file_reports = Vec::with_capacity(files.len());

    for file in &files {
        let (report, records) = process_file(file, &classifier, started_at, &mut diagnostics);
        if let Some((context, records)) = records {
            aggregator.add(&context, records);
        }
        file_reports.push(report);
    }

    let replaced = (aggregator.replaced_vms(), aggregator.replaced_alarms());
    let dataset = aggregator.finish();
    if replaced != (0, 0) {
        info!(
            vms = replaced.0,
            alarms = replaced.1,
            "duplicate records replaced by newer observations"
        );
    }

    let groups: Vec<GroupReport> = exporter
        .export_dataset(&dataset)
        .into_iter()
        .map(GroupReport::from)
        .collect();
    for group in groups.iter() {
        if let GroupOutcome::Failed { error } = &group.outcome {
            diagnostics.push(Diagnostic::error(
                format!("{}/{}", group.client, group.environment),
                format!("export failed: {}", error),
            ));
        }
    }

    let summary_file = if options.write_summary {
        let files_failed = file_reports
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .count();
        let summary = BatchSummary::from_dataset(&dataset, started_at, files.len(), files_failed);
        match exporter.write_summary(&summary) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("could not write processing summary: {}", e);
                diagnostics.push(Diagnostic::warning(
                    exporter.summary_file_name(),
                    format!("summary not written: {}", e),
                ));
                None
            }
        }
    } else {
        None
    };

    let report = BatchReport {
        started_at,
        files: file_reports,
        groups,
        diagnostics,
        summary_file,
    };

    info!(
        groups = report.groups.len(),
        failed_groups = report.failed_groups().count(),
        failed_files = report.failed_files().count(),
        vms = report.total_vms(),
        alarms = report.total_alarms(),
        "batch finished"
    );
    Ok(report)
}

/// Classify, extract and normalize one file.
///
/// Returns the file's report and, unless parsing failed, the records to
/// aggregate under the file's context.
fn process_file(
    file: &BatchFile,
    classifier: &PathClassifier<'_>,
    started_at: DateTime<Utc>,
    diagnostics: &mut Vec<Diagnostic>,
) -> (FileReport, Option<(EnvironmentContext, NormalizedRecords)>) {
    let source = file.source_name();

    let classification = classifier.classify_file(&file.path);
    let classified = !classification.is_fallback();
    let context = classification.into_context();
    if !classified {
        warn!(path = %source, "no environment mapping matched, using {}", context);
        diagnostics.push(Diagnostic::warning(
            source.as_str(),
            format!("no environment mapping matched; classified as {}", context),
        ));
    }

    let mut report = FileReport {
        path: source.clone(),
        client: context.client.clone(),
        environment: context.environment.clone(),
        classified,
        status: FileStatus::Processed,
        vms_extracted: 0,
        alarms_extracted: 0,
        vms_dropped: 0,
        alarms_dropped: 0,
    };

    let extracted = match extractor::extract(&file.content, file.format) {
        Ok(extracted) => extracted,
        Err(e) => {
            error!(path = %source, "skipping file: {}", e);
            diagnostics.push(Diagnostic::error(source.as_str(), e.to_string()));
            report.status = FileStatus::Failed;
            return (report, None);
        }
    };
    let (extracted, extract_diagnostics) = extracted.into_parts();
    for diagnostic in extract_diagnostics {
        diagnostics.push(Diagnostic { source: source.clone(), ..diagnostic });
    }
    if extracted.is_empty() {
        warn!(path = %source, "no VM or alarm entries found");
    }

    let normalizer = Normalizer::new(&context, &source, started_at);
    let (records, normalize_diagnostics) = normalizer.normalize_all(&extracted).into_parts();
    diagnostics.extend(normalize_diagnostics);

    report.vms_extracted = records.vms.len();
    report.alarms_extracted = records.alarms.len();
    report.vms_dropped = records.vms_dropped;
    report.alarms_dropped = records.alarms_dropped;

    info!(
        path = %source,
        client = %context.client,
        environment = %context.environment,
        vms = report.vms_extracted,
        alarms = report.alarms_extracted,
        dropped = report.vms_dropped + report.alarms_dropped,
        "file processed"
    );

    (report, Some((context, records)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
