//! Enum types for fleet entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity discriminator used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Server,
    FileArtifact,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Server => write!(f, "Server"),
            EntityKind::FileArtifact => write!(f, "FileArtifact"),
        }
    }
}

/// Power status of a monitored server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    On,
    Off,
    /// Status has never been reported.
    #[default]
    None,
}

impl ServerStatus {
    /// Database representation; `None` is stored as SQL NULL.
    pub fn as_db_str(&self) -> Option<&'static str> {
        match self {
            ServerStatus::On => Some("on"),
            ServerStatus::Off => Some("off"),
            ServerStatus::None => None,
        }
    }

    /// Parse from the nullable database column.
    pub fn from_db_str(value: Option<&str>) -> Self {
        match value {
            Some("on") => ServerStatus::On,
            Some("off") => ServerStatus::Off,
            _ => ServerStatus::None,
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, ServerStatus::None)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str().unwrap_or(""))
    }
}

/// Strict parser used for spreadsheet cells: only `on` and `off` are accepted.
impl FromStr for ServerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(ServerStatus::On),
            "off" => Ok(ServerStatus::Off),
            other => Err(format!("status must be \"on\" or \"off\", got {:?}", other)),
        }
    }
}

/// Requested sort direction. `None` and `Asc` both sort ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    None,
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Desc)
    }
}

/// Columns a list query may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Id,
    Name,
    Ipv4,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Name => "name",
            SortColumn::Ipv4 => "ipv4",
            SortColumn::Status => "status",
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
        }
    }

    /// The store's natural order key; list results are cached only under it.
    pub fn is_default_order(&self) -> bool {
        matches!(self, SortColumn::CreatedAt)
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(SortColumn::Id),
            "name" => Ok(SortColumn::Name),
            "ipv4" => Ok(SortColumn::Ipv4),
            "status" => Ok(SortColumn::Status),
            "created_at" | "createdat" => Ok(SortColumn::CreatedAt),
            "updated_at" | "updatedat" => Ok(SortColumn::UpdatedAt),
            _ => Err(format!("Invalid sort column: {}", s)),
        }
    }
}

/// Lifecycle of an exported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// Rendering or uploading is in progress.
    Exporting,
    Exported,
    Fail,
}

impl FileStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            FileStatus::Exporting => "exporting",
            FileStatus::Exported => "exported",
            FileStatus::Fail => "fail",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "exporting" => Ok(FileStatus::Exporting),
            "exported" => Ok(FileStatus::Exported),
            "fail" | "failed" => Ok(FileStatus::Fail),
            _ => Err(format!("Invalid file status: {}", s)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileStatus::Exporting)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_status_strict_parse() {
        assert_eq!("on".parse::<ServerStatus>(), Ok(ServerStatus::On));
        assert_eq!("off".parse::<ServerStatus>(), Ok(ServerStatus::Off));
        assert!("ON".parse::<ServerStatus>().is_err());
        assert!("none".parse::<ServerStatus>().is_err());
        assert!("".parse::<ServerStatus>().is_err());
    }

    #[test]
    fn test_server_status_db_roundtrip() {
        for status in [ServerStatus::On, ServerStatus::Off, ServerStatus::None] {
            assert_eq!(ServerStatus::from_db_str(status.as_db_str()), status);
        }
    }

    #[test]
    fn test_sort_column_whitelist() {
        assert_eq!("created_at".parse::<SortColumn>(), Ok(SortColumn::CreatedAt));
        assert_eq!("Name".parse::<SortColumn>(), Ok(SortColumn::Name));
        assert!("name; DROP TABLE servers".parse::<SortColumn>().is_err());
        assert!(SortColumn::CreatedAt.is_default_order());
        assert!(!SortColumn::Name.is_default_order());
    }

    #[test]
    fn test_file_status_terminal() {
        assert!(!FileStatus::Exporting.is_terminal());
        assert!(FileStatus::Exported.is_terminal());
        assert!(FileStatus::Fail.is_terminal());
        assert_eq!(FileStatus::from_db_str("failed"), Ok(FileStatus::Fail));
    }
}
