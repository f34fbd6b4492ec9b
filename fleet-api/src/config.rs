//! Service Configuration Module
//!
//! One struct per subsystem, each loaded from environment variables with
//! defaults suitable for local development. Binaries build these once at
//! startup and hand them to constructors; nothing reads the environment later.

use crate::constants::*;
use fleet_storage::CacheConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ============================================================================
// QUERY CACHE
// ============================================================================

/// Redis location and cache layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub redis_url: String,
    pub prefix: String,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `FLEET_REDIS_URL` (default: redis://127.0.0.1:6379)
    /// - `FLEET_CACHE_PREFIX` (default: list)
    /// - `FLEET_CACHE_TTL_SECS` (default: 3600)
    pub fn from_env() -> Self {
        Self {
            redis_url: env_string("FLEET_REDIS_URL", DEFAULT_REDIS_URL),
            prefix: env_string("FLEET_CACHE_PREFIX", DEFAULT_CACHE_PREFIX),
            ttl: Duration::from_secs(env_or("FLEET_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_prefix(self.prefix.clone())
            .with_ttl(self.ttl)
    }
}

// ============================================================================
// EXPORT QUEUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub brokers: String,
    pub export_topic: String,
    pub group_id: String,
    /// Producer delivery timeout.
    pub timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_KAFKA_BROKERS.to_string(),
            export_topic: DEFAULT_EXPORT_TOPIC.to_string(),
            group_id: DEFAULT_EXPORT_GROUP_ID.to_string(),
            timeout: Duration::from_millis(DEFAULT_KAFKA_TIMEOUT_MS),
        }
    }
}

impl QueueConfig {
    /// Environment variables:
    /// - `FLEET_KAFKA_BROKERS` (default: localhost:9092)
    /// - `FLEET_KAFKA_EXPORT_TOPIC` (default: fleet.export)
    /// - `FLEET_KAFKA_GROUP_ID` (default: fleet-exporter)
    /// - `FLEET_KAFKA_TIMEOUT_MS` (default: 5000)
    pub fn from_env() -> Self {
        Self {
            brokers: env_string("FLEET_KAFKA_BROKERS", DEFAULT_KAFKA_BROKERS),
            export_topic: env_string("FLEET_KAFKA_EXPORT_TOPIC", DEFAULT_EXPORT_TOPIC),
            group_id: env_string("FLEET_KAFKA_GROUP_ID", DEFAULT_EXPORT_GROUP_ID),
            timeout: Duration::from_millis(env_or(
                "FLEET_KAFKA_TIMEOUT_MS",
                DEFAULT_KAFKA_TIMEOUT_MS,
            )),
        }
    }
}

// ============================================================================
// EXPORT WORKER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWorkerConfig {
    /// Where spreadsheets are rendered before upload.
    pub temp_dir: PathBuf,
    /// Bytes per upload message.
    pub chunk_size: usize,
    /// Jobs rendered and uploaded at the same time.
    pub max_concurrent_jobs: usize,
    pub file_server_url: String,
}

impl Default for ExportWorkerConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from(DEFAULT_EXPORT_TEMP_DIR),
            chunk_size: DEFAULT_EXPORT_CHUNK_SIZE,
            max_concurrent_jobs: DEFAULT_EXPORT_MAX_CONCURRENT,
            file_server_url: DEFAULT_FILE_SERVER_URL.to_string(),
        }
    }
}

impl ExportWorkerConfig {
    /// Environment variables:
    /// - `FLEET_EXPORT_TEMP_DIR` (default: /tmp/fleet-export)
    /// - `FLEET_EXPORT_CHUNK_SIZE` (default: 65536)
    /// - `FLEET_EXPORT_MAX_CONCURRENT` (default: 4)
    /// - `FLEET_FILE_SERVER_URL` (default: http://127.0.0.1:50052)
    pub fn from_env() -> Self {
        Self {
            temp_dir: PathBuf::from(env_string("FLEET_EXPORT_TEMP_DIR", DEFAULT_EXPORT_TEMP_DIR)),
            chunk_size: env_or("FLEET_EXPORT_CHUNK_SIZE", DEFAULT_EXPORT_CHUNK_SIZE).max(1),
            max_concurrent_jobs: env_or("FLEET_EXPORT_MAX_CONCURRENT", DEFAULT_EXPORT_MAX_CONCURRENT)
                .max(1),
            file_server_url: env_string("FLEET_FILE_SERVER_URL", DEFAULT_FILE_SERVER_URL),
        }
    }

    /// Config for tests: renders under `temp_dir`, small chunks.
    pub fn development(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            chunk_size: 1024,
            max_concurrent_jobs: 2,
            ..Default::default()
        }
    }
}

// ============================================================================
// IMPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub upload_dir: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
        }
    }
}

impl ImportConfig {
    /// Environment variables:
    /// - `FLEET_UPLOAD_DIR` (default: /tmp/fleet-upload)
    pub fn from_env() -> Self {
        Self {
            upload_dir: PathBuf::from(env_string("FLEET_UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
        }
    }
}

// ============================================================================
// FILE SERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileServerConfig {
    pub root: PathBuf,
    pub bind_addr: String,
    pub port: u16,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_FILES_ROOT),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_FILES_PORT,
        }
    }
}

impl FileServerConfig {
    /// Environment variables:
    /// - `FLEET_FILES_ROOT` (default: /var/lib/fleet/files)
    /// - `FLEET_API_BIND` (default: 0.0.0.0)
    /// - `FLEET_FILES_PORT` (default: 50052)
    pub fn from_env() -> Self {
        Self {
            root: PathBuf::from(env_string("FLEET_FILES_ROOT", DEFAULT_FILES_ROOT)),
            bind_addr: env_string("FLEET_API_BIND", DEFAULT_BIND_ADDR),
            port: env_or("FLEET_FILES_PORT", DEFAULT_FILES_PORT),
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Listener and identity settings of the fleet-api binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub port: u16,
    pub admin_port: u16,
    pub service_name: String,
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_API_PORT,
            admin_port: DEFAULT_ADMIN_PORT,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            environment: "development".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Environment variables:
    /// - `FLEET_API_BIND` (default: 0.0.0.0)
    /// - `FLEET_API_PORT` (default: 50051)
    /// - `FLEET_ADMIN_PORT` (default: 9090)
    /// - `FLEET_SERVICE_NAME` (default: fleet-api)
    /// - `FLEET_ENVIRONMENT` (default: development)
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_string("FLEET_API_BIND", DEFAULT_BIND_ADDR),
            port: env_or("FLEET_API_PORT", DEFAULT_API_PORT),
            admin_port: env_or("FLEET_ADMIN_PORT", DEFAULT_ADMIN_PORT),
            service_name: env_string("FLEET_SERVICE_NAME", DEFAULT_SERVICE_NAME),
            environment: env_string("FLEET_ENVIRONMENT", "development"),
        }
    }

    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.admin_port)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
