//! Per-group artifact writer.
//!
//! Every record kind present in a group is written as CSV, XLSX and JSON.
//! All artifacts of a group are first written to `.tmp` siblings and only
//! renamed into place once every write succeeded, so a group either produces
//! its full set of files or none.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use processor_core::error::ProcessorError;
use processor_core::models::{Cell, EnvironmentContext, RecordKind, TabularRecord};
use processor_data::aggregator::{Dataset, RecordGroup};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::ExportError;
use crate::excel;
use crate::summary::BatchSummary;

/// `strftime` pattern of the batch timestamp embedded in every file name.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const PROBE_FILE: &str = ".write_probe";

// ── Formats ───────────────────────────────────────────────────────────────────

/// Artifact formats, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Xlsx,
    Json,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Csv, OutputFormat::Xlsx, OutputFormat::Json];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Json => "json",
        }
    }
}

// ── GroupExport ───────────────────────────────────────────────────────────────

/// Outcome of exporting one group.
#[derive(Debug)]
pub struct GroupExport {
    pub context: EnvironmentContext,
    pub vm_count: usize,
    pub alarm_count: usize,
    /// Final paths of every artifact written, or the first write failure.
    pub result: Result<Vec<PathBuf>, ExportError>,
}

impl GroupExport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn files(&self) -> &[PathBuf] {
        match &self.result {
            Ok(files) => files,
            Err(_) => &[],
        }
    }
}

/// A `.tmp` file awaiting promotion to its final name.
#[derive(Debug)]
struct Staged {
    tmp: PathBuf,
    target: PathBuf,
}

// ── Exporter ──────────────────────────────────────────────────────────────────

/// Writes a [`Dataset`] into `output_dir`.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    stamp: String,
}

impl Exporter {
    /// `started_at` is the batch start time shared by every file name.
    pub fn new(output_dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stamp: started_at.format(FILE_TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory and confirm it is writable.
    ///
    /// Failure here is batch-fatal.
    pub fn prepare(&self) -> processor_core::error::Result<()> {
        let unusable = |source: std::io::Error| ProcessorError::OutputDirectory {
            path: self.output_dir.clone(),
            source,
        };
        fs::create_dir_all(&self.output_dir).map_err(unusable)?;
        let probe = self.output_dir.join(PROBE_FILE);
        fs::write(&probe, b"").map_err(unusable)?;
        fs::remove_file(&probe).map_err(unusable)?;
        Ok(())
    }

    /// `{prefix}_{client}_{environment}_{YYYYMMDD_HHMMSS}.{ext}`
    pub fn file_name(&self, kind: RecordKind, context: &EnvironmentContext, format: OutputFormat) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            kind.file_prefix(),
            sanitize_component(&context.client),
            sanitize_component(&context.environment),
            self.stamp,
            format.extension()
        )
    }

    pub fn summary_file_name(&self) -> String {
        format!("processing_summary_{}.json", self.stamp)
    }

    /// Export every group; a failed group does not stop the others.
    ///
    /// Groups whose names sanitize to the same string would share artifact
    /// paths. The first group in dataset order keeps them and every later
    /// group claiming one of them fails without writing anything.
    pub fn export_dataset(&self, dataset: &Dataset) -> Vec<GroupExport> {
        let mut claimed: HashMap<PathBuf, EnvironmentContext> = HashMap::new();
        dataset
            .groups()
            .map(|group| {
                let targets = self.planned_targets(group);
                if let Some((path, owner)) = targets
                    .iter()
                    .find_map(|path| claimed.get(path).map(|owner| (path, owner)))
                {
                    return self.collision(group, path, owner);
                }
                for path in targets {
                    claimed.insert(path, group.context().clone());
                }
                self.export_group(group)
            })
            .collect()
    }

    /// Final paths `export_group` would write for `group`.
    pub fn planned_targets(&self, group: &RecordGroup) -> Vec<PathBuf> {
        let mut targets = Vec::new();
        for (kind, present) in [
            (RecordKind::Vm, !group.vms().is_empty()),
            (RecordKind::Alarm, !group.alarms().is_empty()),
        ] {
            if !present {
                continue;
            }
            for format in OutputFormat::ALL {
                targets.push(self.output_dir.join(self.file_name(kind, group.context(), format)));
            }
        }
        targets
    }

    fn collision(&self, group: &RecordGroup, path: &Path, owner: &EnvironmentContext) -> GroupExport {
        let context = group.context().clone();
        error!(
            client = %context.client,
            environment = %context.environment,
            path = %path.display(),
            claimed_by = %owner,
            "group export skipped: artifact name already used in this batch"
        );
        GroupExport {
            vm_count: group.vms().len(),
            alarm_count: group.alarms().len(),
            context,
            result: Err(ExportError::NameCollision {
                path: path.to_path_buf(),
                claimed_by: owner.to_string(),
            }),
        }
    }

    pub fn export_group(&self, group: &RecordGroup) -> GroupExport {
        let context = group.context().clone();
        let mut staged = Vec::new();

        let written = self
            .stage_kind(group.vms(), &context, &mut staged)
            .and_then(|_| self.stage_kind(group.alarms(), &context, &mut staged))
            .and_then(|_| commit(&staged));

        let result = match written {
            Ok(files) => {
                info!(
                    client = %context.client,
                    environment = %context.environment,
                    vms = group.vms().len(),
                    alarms = group.alarms().len(),
                    files = files.len(),
                    "group exported"
                );
                Ok(files)
            }
            Err(e) => {
                discard(&staged);
                error!(
                    client = %context.client,
                    environment = %context.environment,
                    "group export failed: {}",
                    e
                );
                Err(e)
            }
        };

        GroupExport {
            vm_count: group.vms().len(),
            alarm_count: group.alarms().len(),
            context,
            result,
        }
    }

    /// Write the batch summary report; returns its final path.
    pub fn write_summary(&self, summary: &BatchSummary) -> Result<PathBuf, ExportError> {
        let target = self.output_dir.join(self.summary_file_name());
        let tmp = tmp_path(&target);
        if let Err(e) = write_json(summary, &tmp) {
            if tmp.exists() {
                remove_quietly(&tmp);
            }
            return Err(e);
        }
        fs::rename(&tmp, &target).map_err(|e| {
            remove_quietly(&tmp);
            ExportError::io(&target, e)
        })?;
        Ok(target)
    }

    fn stage_kind<R: TabularRecord>(
        &self,
        records: &[R],
        context: &EnvironmentContext,
        staged: &mut Vec<Staged>,
    ) -> Result<(), ExportError> {
        if records.is_empty() {
            return Ok(());
        }
        for format in OutputFormat::ALL {
            let target = self.output_dir.join(self.file_name(R::KIND, context, format));
            let tmp = tmp_path(&target);
            staged.push(Staged {
                tmp: tmp.clone(),
                target,
            });
            match format {
                OutputFormat::Csv => write_csv(records, &tmp)?,
                OutputFormat::Xlsx => excel::write_workbook(records, &tmp)?,
                OutputFormat::Json => write_json(records, &tmp)?,
            }
            debug!(path = %tmp.display(), "staged {} {}", R::KIND, format.extension());
        }
        Ok(())
    }
}

// ── Writers ───────────────────────────────────────────────────────────────────

fn write_csv<R: TabularRecord>(records: &[R], path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_path(path)?;
    writer.write_record(R::COLUMNS)?;
    for record in records {
        writer.write_record(record.cells().iter().map(Cell::render))?;
    }
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| ExportError::io(path, e))?;
    Ok(())
}

// ── Staging ───────────────────────────────────────────────────────────────────

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Promote every staged file; on a failed rename, roll back what was promoted.
fn commit(staged: &[Staged]) -> Result<Vec<PathBuf>, ExportError> {
    let mut promoted: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for entry in staged {
        if let Err(e) = fs::rename(&entry.tmp, &entry.target) {
            for path in &promoted {
                remove_quietly(path);
            }
            return Err(ExportError::io(&entry.target, e));
        }
        promoted.push(entry.target.clone());
    }
    Ok(promoted)
}

fn discard(staged: &[Staged]) {
    for entry in staged {
        if entry.tmp.exists() {
            remove_quietly(&entry.tmp);
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), "could not remove partial output: {}", e);
    }
}

/// Keep ASCII alphanumerics, `-`, `_` and `.`; anything else becomes `_`.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use processor_core::models::{AlarmRecord, AlarmStatus, PowerState, Severity, VmRecord};
    use processor_data::aggregator::DatasetAggregator;
    use processor_data::normalizer::NormalizedRecords;
    use tempfile::TempDir;

    fn started_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap()
    }

    fn prod() -> EnvironmentContext {
        EnvironmentContext::new("client-a", "production-vc1")
    }

    fn vm(ctx: &EnvironmentContext, name: &str) -> VmRecord {
        VmRecord {
            name: name.to_string(),
            uuid: None,
            power_state: PowerState::On,
            cpu_count: 2,
            memory_mb: 4096,
            disk_gb: 40.0,
            network_count: 1,
            guest_os: Some("Windows Server 2019".to_string()),
            host_name: Some("esx01".to_string()),
            cluster_name: None,
            datacenter_name: None,
            client: ctx.client.clone(),
            environment: ctx.environment.clone(),
            source_file: "vm_inventory.json".to_string(),
            ingested_at: started_at(),
        }
    }

    fn alarm(ctx: &EnvironmentContext, vm_name: &str) -> AlarmRecord {
        AlarmRecord {
            vm_name: vm_name.to_string(),
            alarm_name: "Host CPU usage".to_string(),
            description: "CPU, above threshold".to_string(),
            severity: Severity::Warning,
            status: AlarmStatus::Active,
            triggered_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()),
            acknowledged: false,
            client: ctx.client.clone(),
            environment: ctx.environment.clone(),
            source_file: "vm_alarms.json".to_string(),
        }
    }

    fn dataset(contexts: &[EnvironmentContext]) -> Dataset {
        DatasetAggregator::aggregate(
            contexts.iter().map(|ctx| {
                (
                    ctx.clone(),
                    NormalizedRecords {
                        vms: vec![vm(ctx, "web01"), vm(ctx, "db01")],
                        alarms: vec![alarm(ctx, "web01")],
                        ..Default::default()
                    },
                )
            }),
            true,
        )
    }

    fn regular_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // ── Naming ───────────────────────────────────────────────────────────────

    #[test]
    fn test_file_name_pattern() {
        let exporter = Exporter::new("/out", started_at());
        assert_eq!(
            exporter.file_name(RecordKind::Vm, &prod(), OutputFormat::Csv),
            "vcenter_vms_client-a_production-vc1_20240115_123045.csv"
        );
        assert_eq!(
            exporter.file_name(RecordKind::Alarm, &EnvironmentContext::combined(), OutputFormat::Xlsx),
            "vcenter_alarms_ALL_ALL_20240115_123045.xlsx"
        );
        assert_eq!(exporter.summary_file_name(), "processing_summary_20240115_123045.json");
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("client-a"), "client-a");
        assert_eq!(sanitize_component("acme/eu west"), "acme_eu_west");
        assert_eq!(sanitize_component("   "), "_");
    }

    #[test]
    fn test_tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/out/a.csv")),
            PathBuf::from("/out/a.csv.tmp")
        );
    }

    // ── prepare ──────────────────────────────────────────────────────────────

    #[test]
    fn test_prepare_creates_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        Exporter::new(&out, started_at()).prepare().unwrap();
        assert!(out.is_dir());
        assert!(regular_files(&out).is_empty());
    }

    #[test]
    fn test_prepare_fails_when_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("occupied");
        fs::write(&out, "x").unwrap();
        let err = Exporter::new(&out, started_at()).prepare().unwrap_err();
        assert!(matches!(err, ProcessorError::OutputDirectory { .. }));
    }

    // ── export_group ─────────────────────────────────────────────────────────

    #[test]
    fn test_group_writes_three_formats_per_kind() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        let exports = exporter.export_dataset(&dataset(&[prod()]));

        assert_eq!(exports.len(), 1);
        let export = &exports[0];
        assert!(export.is_success());
        assert_eq!((export.vm_count, export.alarm_count), (2, 1));
        assert_eq!(export.files().len(), 6);
        assert_eq!(
            regular_files(dir.path()),
            vec![
                "vcenter_alarms_client-a_production-vc1_20240115_123045.csv",
                "vcenter_alarms_client-a_production-vc1_20240115_123045.json",
                "vcenter_alarms_client-a_production-vc1_20240115_123045.xlsx",
                "vcenter_vms_client-a_production-vc1_20240115_123045.csv",
                "vcenter_vms_client-a_production-vc1_20240115_123045.json",
                "vcenter_vms_client-a_production-vc1_20240115_123045.xlsx",
            ]
        );
    }

    #[test]
    fn test_csv_uses_canonical_columns_and_quotes_text() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        exporter.export_dataset(&dataset(&[prod()]));

        let csv_path = dir
            .path()
            .join(exporter.file_name(RecordKind::Alarm, &prod(), OutputFormat::Csv));
        let content = fs::read_to_string(csv_path).unwrap();
        let mut lines = content.lines();
        let expected_header: Vec<String> =
            AlarmRecord::COLUMNS.iter().map(|c| format!("\"{}\"", c)).collect();
        assert_eq!(lines.next().unwrap(), expected_header.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "\"web01\",\"Host CPU usage\",\"CPU, above threshold\",\"warning\",\"active\",\
             \"2024-01-15T09:00:00Z\",\"false\",\"client-a\",\"production-vc1\",\"vm_alarms.json\""
        );
    }

    #[test]
    fn test_csv_numbers_unquoted_and_missing_values_empty() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        exporter.export_dataset(&dataset(&[prod()]));

        let csv_path = dir
            .path()
            .join(exporter.file_name(RecordKind::Vm, &prod(), OutputFormat::Csv));
        let content = fs::read_to_string(csv_path).unwrap();
        let first_row = content.lines().nth(1).unwrap();
        assert!(first_row.starts_with("\"web01\","));
        assert!(first_row.contains(",\"on\",2,4096,40,1,\"Windows Server 2019\",\"esx01\","));
    }

    #[test]
    fn test_json_field_order_matches_columns() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        exporter.export_dataset(&dataset(&[prod()]));

        let json_path = dir
            .path()
            .join(exporter.file_name(RecordKind::Vm, &prod(), OutputFormat::Json));
        let content = fs::read_to_string(json_path).unwrap();
        let positions: Vec<usize> = VmRecord::COLUMNS
            .iter()
            .map(|c| content.find(&format!("\"{}\":", c)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let parsed: Vec<VmRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "db01");
    }

    #[test]
    fn test_failed_write_leaves_no_partial_group() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        // A directory squatting on the staging path makes the JSON write fail.
        let blocked = dir
            .path()
            .join(exporter.file_name(RecordKind::Vm, &prod(), OutputFormat::Json));
        fs::create_dir(tmp_path(&blocked)).unwrap();

        let exports = exporter.export_dataset(&dataset(&[prod()]));
        assert_eq!(exports.len(), 1);
        assert!(!exports[0].is_success());
        assert!(exports[0].files().is_empty());
        assert!(matches!(exports[0].result, Err(ExportError::Io { .. })));
        assert!(regular_files(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_group_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        let dev = EnvironmentContext::new("internal", "development");
        let blocked = dir
            .path()
            .join(exporter.file_name(RecordKind::Alarm, &prod(), OutputFormat::Csv));
        fs::create_dir(tmp_path(&blocked)).unwrap();

        let exports = exporter.export_dataset(&dataset(&[prod(), dev.clone()]));
        assert_eq!(exports.len(), 2);
        assert!(!exports[0].is_success());
        assert!(exports[1].is_success());
        assert_eq!(exports[1].context, dev);
        assert_eq!(regular_files(dir.path()).len(), 6);
    }

    // ── Name collisions ──────────────────────────────────────────────────────

    #[test]
    fn test_planned_targets_skip_empty_kinds() {
        let exporter = Exporter::new("/out", started_at());
        let ctx = prod();
        let dataset = DatasetAggregator::aggregate(
            [(ctx.clone(), NormalizedRecords { vms: vec![vm(&ctx, "web01")], ..Default::default() })],
            true,
        );
        let group = dataset.group(&ctx).unwrap();
        let targets = exporter.planned_targets(group);
        assert_eq!(targets.len(), 3);
        assert_eq!(
            targets[0],
            Path::new("/out").join("vcenter_vms_client-a_production-vc1_20240115_123045.csv")
        );
    }

    #[test]
    fn test_colliding_names_fail_later_group() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        let spaced = EnvironmentContext::new("acme corp", "prod");
        let underscored = EnvironmentContext::new("acme_corp", "prod");
        let dataset = DatasetAggregator::aggregate(
            [&spaced, &underscored].into_iter().map(|ctx| {
                (ctx.clone(), NormalizedRecords { vms: vec![vm(ctx, "web01")], ..Default::default() })
            }),
            true,
        );

        let exports = exporter.export_dataset(&dataset);
        assert_eq!(exports.len(), 2);
        // "acme corp" sorts before "acme_corp" and keeps the names.
        assert_eq!(exports[0].context, spaced);
        assert!(exports[0].is_success());
        assert_eq!(exports[0].files().len(), 3);

        assert_eq!(exports[1].context, underscored);
        assert!(exports[1].files().is_empty());
        match &exports[1].result {
            Err(ExportError::NameCollision { path, claimed_by }) => {
                assert_eq!(claimed_by, "acme corp/prod");
                assert!(exports[0].files().contains(path));
            }
            other => panic!("expected a name collision, got {:?}", other),
        }

        // The first group's files were not overwritten.
        assert_eq!(regular_files(dir.path()).len(), 3);
        let json = fs::read_to_string(
            dir.path().join("vcenter_vms_acme_corp_prod_20240115_123045.json"),
        )
        .unwrap();
        assert!(json.contains("\"client\": \"acme corp\""));
    }

    #[test]
    fn test_disjoint_kinds_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path(), started_at());
        let spaced = EnvironmentContext::new("acme corp", "prod");
        let underscored = EnvironmentContext::new("acme_corp", "prod");
        let dataset = DatasetAggregator::aggregate(
            [
                (spaced.clone(), NormalizedRecords { vms: vec![vm(&spaced, "web01")], ..Default::default() }),
                (
                    underscored.clone(),
                    NormalizedRecords { alarms: vec![alarm(&underscored, "web01")], ..Default::default() },
                ),
            ],
            true,
        );

        let exports = exporter.export_dataset(&dataset);
        assert!(exports.iter().all(GroupExport::is_success));
        assert_eq!(regular_files(dir.path()).len(), 6);
    }
}
