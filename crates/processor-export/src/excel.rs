//! Excel workbook writer.
//!
//! One worksheet per record kind, a styled header row, auto-sized columns and
//! a frozen header. Styling problems degrade to plain output; only failures
//! writing cell data or saving the workbook are errors.

use std::path::Path;

use processor_core::models::{Cell, TabularRecord};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use tracing::warn;

use crate::error::ExportError;

/// Header fill colour.
const HEADER_BACKGROUND: u32 = 0x366092;

/// Upper bound for an auto-sized column, in characters.
const MAX_COLUMN_WIDTH: usize = 50;

/// Write `records` to a single-sheet workbook at `path`.
pub fn write_workbook<R: TabularRecord>(records: &[R], path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(R::KIND.sheet_name())?;

    write_header(worksheet, R::COLUMNS)?;

    let mut widths: Vec<usize> = R::COLUMNS.iter().map(|c| c.chars().count()).collect();
    for (index, record) in records.iter().enumerate() {
        let row = row_number(index + 1);
        for (col, cell) in record.cells().iter().enumerate() {
            write_cell(worksheet, row, col_number(col), cell)?;
            if let Some(width) = widths.get_mut(col) {
                *width = (*width).max(cell.render().chars().count());
            }
        }
    }

    if let Err(e) = apply_layout(worksheet, &widths) {
        warn!(path = %path.display(), "keeping default sheet layout: {}", e);
    }

    workbook.save(path)?;
    Ok(())
}

fn write_header(worksheet: &mut Worksheet, columns: &[&str]) -> Result<(), XlsxError> {
    let format = header_format();
    let styled = columns.iter().enumerate().try_for_each(|(col, name)| {
        worksheet
            .write_string_with_format(0, col_number(col), *name, &format)
            .map(|_| ())
    });
    if let Err(e) = styled {
        warn!("header styling failed, writing plain header: {}", e);
        for (col, name) in columns.iter().enumerate() {
            worksheet.write_string(0, col_number(col), *name)?;
        }
    }
    Ok(())
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_BACKGROUND))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<(), XlsxError> {
    match cell {
        Cell::Text(s) => worksheet.write_string(row, col, s.as_str()).map(|_| ()),
        Cell::Integer(n) => worksheet.write_number(row, col, *n as f64).map(|_| ()),
        Cell::Float(f) => worksheet.write_number(row, col, *f).map(|_| ()),
        Cell::Bool(b) => worksheet.write_boolean(row, col, *b).map(|_| ()),
        Cell::Empty => Ok(()),
    }
}

fn apply_layout(worksheet: &mut Worksheet, widths: &[usize]) -> Result<(), XlsxError> {
    for (col, width) in widths.iter().enumerate() {
        let adjusted = (width + 2).min(MAX_COLUMN_WIDTH);
        worksheet.set_column_width(col_number(col), adjusted as f64)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

// Out-of-range indices saturate so the sheet rejects them with a limit error.
fn row_number(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

fn col_number(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use processor_core::models::{AlarmRecord, AlarmStatus, PowerState, Severity, VmRecord};
    use tempfile::TempDir;

    fn vm(name: &str) -> VmRecord {
        VmRecord {
            name: name.to_string(),
            uuid: Some("4210-aaaa".to_string()),
            power_state: PowerState::On,
            cpu_count: 4,
            memory_mb: 8192,
            disk_gb: 120.5,
            network_count: 2,
            guest_os: Some("Ubuntu Linux (64-bit)".to_string()),
            host_name: None,
            cluster_name: None,
            datacenter_name: None,
            client: "client-a".to_string(),
            environment: "production-vc1".to_string(),
            source_file: "client-a/prod-vcenter1/vm_inventory.json".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    fn is_zip(path: &Path) -> bool {
        std::fs::read(path)
            .map(|bytes| bytes.starts_with(b"PK"))
            .unwrap_or(false)
    }

    #[test]
    fn test_writes_vm_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vms.xlsx");
        write_workbook(&[vm("web01"), vm("db01")], &path).unwrap();
        assert!(is_zip(&path));
    }

    #[test]
    fn test_writes_alarm_workbook_with_missing_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alarms.xlsx");
        let alarm = AlarmRecord {
            vm_name: "web01".to_string(),
            alarm_name: "CPU usage".to_string(),
            description: String::new(),
            severity: Severity::Critical,
            status: AlarmStatus::Active,
            triggered_at: None,
            acknowledged: false,
            client: "client-a".to_string(),
            environment: "production-vc1".to_string(),
            source_file: "vm_alarms.json".to_string(),
        };
        write_workbook(&[alarm], &path).unwrap();
        assert!(is_zip(&path));
    }

    #[test]
    fn test_header_only_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xlsx");
        write_workbook::<VmRecord>(&[], &path).unwrap();
        assert!(is_zip(&path));
    }

    #[test]
    fn test_unwritable_path_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("vms.xlsx");
        let err = write_workbook(&[vm("web01")], &path).unwrap_err();
        assert!(matches!(err, ExportError::Xlsx(_)));
    }

    #[test]
    fn test_index_conversion_saturates() {
        assert_eq!(row_number(3), 3);
        assert_eq!(col_number(70_000), u16::MAX);
    }
}
