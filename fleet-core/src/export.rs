//! Export job payload carried through the export queue.

use crate::{
    FleetError, FleetResult, ServerFilter, ServerQuery, SortColumn, SortDirection, SortOrder,
    UserId, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Only spreadsheet output is produced.
pub const EXPORT_EXTENSION: &str = ".xlsx";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    pub file_name: String,
}

/// Page range of an export. `to_page` is exclusive. Without `from_page` the
/// export starts at the first row and spans `to_page` pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort: SortDirection,
}

/// Request to render a filtered slice of the inventory to a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub user_id: UserId,
    pub file: ExportFile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ServerFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<ExportPagination>,
}

impl ExportJob {
    pub fn new(user_id: UserId, file_name: impl Into<String>) -> Self {
        Self {
            user_id,
            file: ExportFile {
                file_name: file_name.into(),
            },
            filter: None,
            pagination: None,
        }
    }

    pub fn with_filter(mut self, filter: ServerFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_pagination(mut self, pagination: ExportPagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }

    /// Reject jobs the worker could never complete.
    pub fn validate(&self) -> FleetResult<()> {
        let name = self.file.file_name.trim();
        if name.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "file_name".to_string(),
            }
            .into());
        }
        if !name.ends_with(EXPORT_EXTENSION) {
            return Err(FleetError::invalid("file_name", "must end with .xlsx"));
        }
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(FleetError::invalid("file_name", "must be a plain file name"));
        }
        if let Some(p) = &self.pagination {
            for (field, value) in [
                ("page_size", p.page_size),
                ("from_page", p.from_page),
                ("to_page", p.to_page),
            ] {
                if value.is_some_and(|v| v < 1) {
                    return Err(FleetError::invalid(field, "must be at least 1"));
                }
            }
            if let (Some(from), Some(to)) = (p.from_page, p.to_page) {
                if to <= from {
                    return Err(FleetError::invalid("to_page", "must follow from_page"));
                }
            }
        }
        self.to_query().map(|_| ())
    }

    /// Resolve into the store query the worker runs.
    pub fn to_query(&self) -> FleetResult<ServerQuery> {
        let mut query = ServerQuery::all();
        if let Some(filter) = &self.filter {
            query.filter = filter.resolve()?;
        }
        if let Some(p) = &self.pagination {
            if let Some(size) = p.page_size {
                if let Some(from) = p.from_page {
                    query.offset = Some((from - 1) * size);
                }
                if let Some(to) = p.to_page {
                    query.limit = Some(size * (to - p.from_page.unwrap_or(0)));
                }
            }
            if let Some(sort_by) = p.sort_by.as_deref().filter(|s| !s.is_empty()) {
                let column = sort_by
                    .parse::<SortColumn>()
                    .map_err(|reason| FleetError::invalid("sort_by", reason))?;
                query.order = Some(SortOrder {
                    column,
                    direction: p.sort,
                });
            }
        }
        Ok(query)
    }

    pub fn to_json(&self) -> FleetResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FleetError::invalid("export", e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> FleetResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| FleetError::invalid("export", format!("undecodable job: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerStatus;

    #[test]
    fn test_file_name_must_be_xlsx() {
        assert!(ExportJob::new(1, "servers.xlsx").validate().is_ok());
        assert!(ExportJob::new(1, "servers.csv").validate().is_err());
        assert!(ExportJob::new(1, "").validate().is_err());
        assert!(ExportJob::new(1, "../etc/x.xlsx").validate().is_err());
    }

    #[test]
    fn test_page_range_resolves_to_offset_and_limit() {
        let job = ExportJob::new(1, "a.xlsx").with_pagination(ExportPagination {
            page_size: Some(50),
            from_page: Some(2),
            to_page: Some(4),
            ..Default::default()
        });
        let query = job.to_query().unwrap();
        assert_eq!(query.offset, Some(50));
        assert_eq!(query.limit, Some(100));
    }

    #[test]
    fn test_open_start_range_spans_to_page_pages() {
        let job = ExportJob::new(1, "a.xlsx").with_pagination(ExportPagination {
            page_size: Some(20),
            to_page: Some(3),
            ..Default::default()
        });
        let query = job.to_query().unwrap();
        assert_eq!(query.offset, None);
        assert_eq!(query.limit, Some(60));
    }

    #[test]
    fn test_empty_page_range_is_rejected() {
        let job = ExportJob::new(1, "a.xlsx").with_pagination(ExportPagination {
            page_size: Some(10),
            from_page: Some(3),
            to_page: Some(3),
            ..Default::default()
        });
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_inverted_page_range_is_rejected() {
        let job = ExportJob::new(1, "a.xlsx").with_pagination(ExportPagination {
            page_size: Some(10),
            from_page: Some(5),
            to_page: Some(2),
            ..Default::default()
        });
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_json_wire_format() {
        let job = ExportJob::new(42, "on.xlsx").with_filter(ServerFilter::with_status(ServerStatus::On));
        let bytes = job.to_json().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"file_name\":\"on.xlsx\""));
        assert!(text.contains("\"status\":\"on\""));
        assert_eq!(ExportJob::from_json(&bytes).unwrap(), job);
        assert!(ExportJob::from_json(b"not json").is_err());
    }
}
