//! Error types for fleet inventory operations

use crate::EntityKind;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity} with key {key}")]
    NotFound { entity: EntityKind, key: String },

    #[error("Entity already exists: {entity} with key {key}")]
    AlreadyExists { entity: EntityKind, key: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid RFC3339 timestamp for {field}: {value}")]
    InvalidTimestamp { field: String, value: String },

    #[error("Unknown column {column}, accepted columns are id, name, ipv4, status")]
    UnknownColumn { column: String },

    #[error("Invalid row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("Update carries no fields")]
    EmptyPatch,
}

/// Query cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },
}

/// Errors raised while moving files through the export/import pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Queue failure: {reason}")]
    Queue { reason: String },

    #[error("Spreadsheet failure: {reason}")]
    Spreadsheet { reason: String },

    #[error("Upload failed: {reason}")]
    Upload { reason: String },

    #[error("I/O failure on {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all fleet errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FleetError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

impl FleetError {
    /// Shorthand for a server lookup miss.
    pub fn server_not_found(key: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity: EntityKind::Server,
            key: key.into(),
        }
        .into()
    }

    /// Shorthand for a name or id collision on a server.
    pub fn server_exists(key: impl Into<String>) -> Self {
        StorageError::AlreadyExists {
            entity: EntityKind::Server,
            key: key.into(),
        }
        .into()
    }

    /// Shorthand for an invalid field value.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
        .into()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FleetError::Storage(StorageError::NotFound { .. }))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity: EntityKind::Server,
            key: "srv-1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("srv-1"));
    }

    #[test]
    fn test_validation_error_display_unknown_column() {
        let err = ValidationError::UnknownColumn {
            column: "hostname".to_string(),
        };
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn test_fleet_error_from_cache_error() {
        let err: FleetError = CacheError::Backend {
            reason: "connection reset".to_string(),
        }
        .into();
        assert!(matches!(err, FleetError::Cache(_)));
        assert!(err.to_string().starts_with("Cache error"));
    }

    #[test]
    fn test_server_not_found_shorthand() {
        let err = FleetError::server_not_found("abc");
        assert!(err.is_not_found());
        assert!(!FleetError::server_exists("abc").is_not_found());
    }
}
