//! Spreadsheet rendering and parsing.
//!
//! Both directions use one fixed layout: a sheet named `Sheet1` whose first
//! row holds the column names. These calls block; async callers run them on
//! `spawn_blocking`.

use calamine::{open_workbook_auto, Data, Reader};
use fleet_core::{FleetResult, ServerRecord, TransferError, SHEET_COLUMNS};
use rust_xlsxwriter::Workbook;
use std::path::Path;

use crate::constants::SHEET_NAME;

fn spreadsheet_error(reason: impl std::fmt::Display) -> TransferError {
    TransferError::Spreadsheet {
        reason: reason.to_string(),
    }
}

/// Write `records` to a new workbook at `path`, one row each under the
/// `id,name,ipv4,status` header. Returns the number of data rows.
pub fn render_servers(records: &[ServerRecord], path: &Path) -> FleetResult<usize> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(spreadsheet_error)?;

    for (col, name) in SHEET_COLUMNS.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *name)
            .map_err(spreadsheet_error)?;
    }
    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        let cells = [
            record.id.to_string(),
            record.name.clone(),
            record.ipv4.clone(),
            record.status.as_db_str().unwrap_or_default().to_string(),
        ];
        for (col, value) in cells.iter().enumerate() {
            sheet
                .write_string(row, col as u16, value)
                .map_err(spreadsheet_error)?;
        }
    }

    workbook.save(path).map_err(spreadsheet_error)?;
    Ok(records.len())
}

/// Read every row of `Sheet1` (or the first sheet when there is none) as
/// cell text. Empty cells come back as empty strings.
pub fn read_rows(path: &Path) -> FleetResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_error)?;

    let names = workbook.sheet_names();
    let sheet = names
        .iter()
        .find(|n| n.as_str() == SHEET_NAME)
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| spreadsheet_error("workbook has no sheets"))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(spreadsheet_error)?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Whole numbers typed into a sheet come back as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{NewServer, ServerStatus};
    use tempfile::TempDir;

    #[test]
    fn test_render_then_read_keeps_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xlsx");
        let now = chrono::Utc::now();
        let records = vec![
            NewServer::new("alpha", "10.0.0.1")
                .with_status(ServerStatus::On)
                .into_record(now),
            NewServer::new("beta", "10.0.0.2").into_record(now),
        ];

        assert_eq!(render_servers(&records, &path).unwrap(), 2);
        let rows = read_rows(&path).unwrap();

        assert_eq!(rows[0], vec!["id", "name", "ipv4", "status"]);
        assert_eq!(rows[1][0], records[0].id.to_string());
        assert_eq!(rows[1][1..], ["alpha", "10.0.0.1", "on"]);
        // Trailing empty cells may be dropped by the reader.
        assert_eq!(rows[2][1], "beta");
        assert!(rows[2].get(3).map_or(true, |s| s.is_empty()));
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xlsx");
        render_servers(&[], &path).unwrap();
        assert_eq!(read_rows(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_falls_back_to_first_sheet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Servers").unwrap();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_number(1, 0, 42.0).unwrap();
        workbook.save(&path).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows, vec![vec!["name".to_string()], vec!["42".to_string()]]);
    }

    #[test]
    fn test_unreadable_file_is_spreadsheet_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();
        assert!(matches!(
            read_rows(&path),
            Err(fleet_core::FleetError::Transfer(TransferError::Spreadsheet { .. }))
        ));
    }
}
