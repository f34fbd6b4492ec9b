//! Fleet Core - Inventory Types
//!
//! Data types shared by every fleet crate: server records and their typed
//! write payloads, the list query model and its fingerprint, export jobs,
//! file artifacts, bulk import parsing, and the error taxonomy.
//! No I/O happens here.

pub mod enums;
pub mod error;
pub mod export;
pub mod file;
pub mod fingerprint;
pub mod identity;
pub mod import;
pub mod query;
pub mod server;

pub use enums::{EntityKind, FileStatus, ServerStatus, SortColumn, SortDirection};
pub use error::{
    CacheError, ConfigError, FleetError, FleetResult, StorageError, TransferError,
    ValidationError,
};
pub use export::{ExportFile, ExportJob, ExportPagination, EXPORT_EXTENSION};
pub use file::{storage_path, FileArtifact};
pub use fingerprint::QueryFingerprint;
pub use identity::{new_entity_id, FileId, ServerId, Timestamp, UserId};
pub use import::{parse_sheet, validate_header, ImportReport, ImportRow, SHEET_COLUMNS};
pub use query::{
    ListServersRequest, Pagination, ResolvedFilter, ServerFilter, ServerQuery, SortOrder,
};
pub use server::{parse_ipv4, FieldMap, NewServer, ServerPatch, ServerRecord};
