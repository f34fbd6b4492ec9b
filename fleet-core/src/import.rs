//! Bulk import row parsing and validation.
//!
//! A sheet is accepted only as a whole: the header must use known columns and
//! every data row must validate, otherwise nothing is handed to the store.

use crate::server::{parse_ipv4, FIELD_ID, FIELD_IPV4, FIELD_NAME, FIELD_STATUS};
use crate::{
    FleetError, FleetResult, NewServer, ServerId, ServerRecord, ServerStatus, UserId,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Header row accepted by import and written by export, in column order.
pub const SHEET_COLUMNS: [&str; 4] = [FIELD_ID, FIELD_NAME, FIELD_IPV4, FIELD_STATUS];

/// Column name to raw cell value for one sheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub cells: BTreeMap<String, String>,
}

impl ImportRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Validate the row and turn it into an insert candidate.
    pub fn into_candidate(self, row: usize, actor: UserId) -> FleetResult<NewServer> {
        let invalid = |reason: String| FleetError::from(ValidationError::InvalidRow { row, reason });

        let id = match self.get(FIELD_ID) {
            Some(raw) => Some(
                raw.parse::<ServerId>()
                    .map_err(|_| invalid(format!("id {:?} is not a UUID", raw)))?,
            ),
            None => None,
        };
        let name = self
            .get(FIELD_NAME)
            .map(str::to_string)
            .ok_or_else(|| invalid("name is required".to_string()))?;
        let ipv4 = self
            .get(FIELD_IPV4)
            .ok_or_else(|| invalid("ipv4 is required".to_string()))?;
        let ipv4 = parse_ipv4(FIELD_IPV4, ipv4)
            .map_err(|e| invalid(e.to_string()))?
            .to_string();
        let status = match self.get(FIELD_STATUS) {
            Some(raw) => raw.parse::<ServerStatus>().map_err(invalid)?,
            None => ServerStatus::None,
        };

        Ok(NewServer {
            id,
            name,
            ipv4,
            status,
            created_by: Some(actor),
        })
    }
}

/// Check the header row; every column must be known and appear once.
pub fn validate_header(header: &[String]) -> FleetResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(header.len());
    for raw in header {
        let column = raw.trim();
        if !SHEET_COLUMNS.contains(&column) {
            return Err(ValidationError::UnknownColumn {
                column: column.to_string(),
            }
            .into());
        }
        if !seen.insert(column.to_string()) {
            return Err(FleetError::invalid("header", format!("duplicate column {}", column)));
        }
        columns.push(column.to_string());
    }
    Ok(columns)
}

/// Parse a whole sheet (header first) into validated insert candidates.
///
/// Blank rows are skipped and blank cells count as absent. Row numbers in
/// errors are 1-based sheet rows, so the first data row is row 2.
pub fn parse_sheet(rows: Vec<Vec<String>>, actor: UserId) -> FleetResult<Vec<NewServer>> {
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or_else(|| {
        FleetError::from(ValidationError::RequiredFieldMissing {
            field: "header".to_string(),
        })
    })?;
    let columns = validate_header(&header)?;

    let mut candidates = Vec::new();
    for (idx, cells) in rows.enumerate() {
        let sheet_row = idx + 2;
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let mut row = ImportRow::default();
        for (pos, cell) in cells.into_iter().enumerate() {
            let value = cell.trim();
            if value.is_empty() {
                continue;
            }
            let column = columns.get(pos).ok_or_else(|| {
                FleetError::from(ValidationError::InvalidRow {
                    row: sheet_row,
                    reason: format!("value {:?} has no header", value),
                })
            })?;
            row.cells.insert(column.clone(), value.to_string());
        }
        candidates.push(row.into_candidate(sheet_row, actor)?);
    }
    Ok(candidates)
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: Vec<ServerRecord>,
    /// Candidates rejected because their id or name already exists.
    pub failed: Vec<NewServer>,
}

impl ImportReport {
    pub fn num_imported(&self) -> i64 {
        self.imported.len() as i64
    }

    pub fn num_failed(&self) -> i64 {
        self.failed.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_header_subset_in_any_order() {
        let rows = sheet(&[&["status", "ipv4", "name"], &["on", "1.2.3.4", "a"]]);
        let parsed = parse_sheet(rows, 5).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "a");
        assert_eq!(parsed[0].status, ServerStatus::On);
        assert_eq!(parsed[0].created_by, Some(5));
        assert_eq!(parsed[0].id, None);
    }

    #[test]
    fn test_unknown_column_rejects_sheet() {
        let rows = sheet(&[&["id", "name", "ipv4", "owner"], &["", "a", "1.2.3.4", "x"]]);
        assert_eq!(
            parse_sheet(rows, 1),
            Err(ValidationError::UnknownColumn {
                column: "owner".to_string()
            }
            .into())
        );
    }

    #[test]
    fn test_duplicate_column_rejects_sheet() {
        let rows = sheet(&[&["name", "name"]]);
        assert!(parse_sheet(rows, 1).is_err());
    }

    #[test]
    fn test_first_bad_row_aborts() {
        let rows = sheet(&[
            &["name", "ipv4", "status"],
            &["a", "1.2.3.4", "on"],
            &["b", "999.1.1.1", "on"],
            &["c", "1.2.3.5", "maybe"],
        ]);
        match parse_sheet(rows, 1) {
            Err(FleetError::Validation(ValidationError::InvalidRow { row, .. })) => {
                assert_eq!(row, 3)
            }
            other => panic!("expected InvalidRow, got {:?}", other),
        }
    }

    #[test]
    fn test_ipv6_is_rejected() {
        let rows = sheet(&[&["name", "ipv4"], &["a", "fe80::1"]]);
        assert!(parse_sheet(rows, 1).is_err());
    }

    #[test]
    fn test_status_is_case_sensitive() {
        let rows = sheet(&[&["name", "ipv4", "status"], &["a", "1.2.3.4", "ON"]]);
        assert!(parse_sheet(rows, 1).is_err());
    }

    #[test]
    fn test_id_must_be_uuid() {
        let rows = sheet(&[&["id", "name", "ipv4"], &["42", "a", "1.2.3.4"]]);
        assert!(parse_sheet(rows, 1).is_err());
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let rows = sheet(&[&["name", "ipv4"], &["", ""], &["a", "1.2.3.4"]]);
        assert_eq!(parse_sheet(rows, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_sheet_is_rejected() {
        assert!(parse_sheet(Vec::new(), 1).is_err());
    }
}
