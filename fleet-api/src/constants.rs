//! Constants for the Fleet API
//!
//! Defaults for every setting read from the environment, plus the fixed
//! names shared by the service, the worker and the file server.

// ============================================================================
// REQUEST METADATA
// ============================================================================

/// Metadata key carrying the caller's role, set by the gateway
pub const ROLE_METADATA_KEY: &str = "role";

/// Metadata key carrying the caller's user id, set by the gateway
pub const USER_ID_METADATA_KEY: &str = "id";

/// Metadata key naming an uploaded spreadsheet
pub const FILENAME_METADATA_KEY: &str = "filename";

/// Metadata key naming the uploading user
pub const USER_METADATA_KEY: &str = "user";

/// Metadata key naming the destination of a file upload
pub const PATH_METADATA_KEY: &str = "path";

/// Role allowed to mutate the inventory
pub const ADMIN_ROLE: &str = "admin";

// ============================================================================
// QUERY CACHE
// ============================================================================

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default cache key prefix
pub const DEFAULT_CACHE_PREFIX: &str = "list";

/// Default cache entry lifetime in seconds (1 hour)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

// ============================================================================
// EXPORT QUEUE
// ============================================================================

/// Default Kafka bootstrap servers
pub const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

/// Default export topic
pub const DEFAULT_EXPORT_TOPIC: &str = "fleet.export";

/// Default consumer group of the export worker
pub const DEFAULT_EXPORT_GROUP_ID: &str = "fleet-exporter";

/// Default producer delivery timeout in milliseconds
pub const DEFAULT_KAFKA_TIMEOUT_MS: u64 = 5000;

/// Buffer of the in-process export channel
pub const CHANNEL_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// EXPORT WORKER
// ============================================================================

/// Default upload chunk size (64 KiB)
pub const DEFAULT_EXPORT_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of export jobs rendered concurrently
pub const DEFAULT_EXPORT_MAX_CONCURRENT: usize = 4;

/// Default scratch directory for rendered spreadsheets
pub const DEFAULT_EXPORT_TEMP_DIR: &str = "/tmp/fleet-export";

/// Default file storage endpoint
pub const DEFAULT_FILE_SERVER_URL: &str = "http://127.0.0.1:50052";

/// Sheet name written by export and preferred by import
pub const SHEET_NAME: &str = "Sheet1";

// ============================================================================
// IMPORT
// ============================================================================

/// Default directory uploads are materialized to
pub const DEFAULT_UPLOAD_DIR: &str = "/tmp/fleet-upload";

// ============================================================================
// FILE SERVER
// ============================================================================

/// Default root directory served by fleet-files
pub const DEFAULT_FILES_ROOT: &str = "/var/lib/fleet/files";

/// Default fleet-files port
pub const DEFAULT_FILES_PORT: u16 = 50052;

// ============================================================================
// SERVICE
// ============================================================================

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default gRPC port of fleet-api
pub const DEFAULT_API_PORT: u16 = 50051;

/// Default admin (metrics) port
pub const DEFAULT_ADMIN_PORT: u16 = 9090;

/// Default service name reported in logs
pub const DEFAULT_SERVICE_NAME: &str = "fleet-api";
