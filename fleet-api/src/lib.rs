//! Fleet API - Inventory Service, Export Worker and File Storage
//!
//! This crate provides the gRPC surface of the fleet inventory and the
//! processes behind it. List reads go through a Redis cache-aside layer
//! over PostgreSQL. Exports travel through Kafka to a worker that renders
//! spreadsheets and streams them to the file storage service. Imports are
//! streamed in, validated as a whole and inserted as one batch.

pub mod auth;
pub mod cached_db;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod file_storage;
pub mod grpc;
pub mod import;
pub mod jobs;
pub mod queue;
pub mod spreadsheet;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{Action, Authorizer, CallerContext, RolePolicy};
pub use cached_db::CachedInventory;
pub use config::{
    CacheSettings, ExportWorkerConfig, FileServerConfig, ImportConfig, QueueConfig, ServiceConfig,
};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use file_storage::{FileStorage, GrpcFileStorage, LocalFileStore, UploadAck};
pub use grpc::{proto, FileServiceImpl, ServerServiceImpl};
pub use import::ImportProcessor;
pub use jobs::{export_worker_task, ExportWorker, ExportWorkerMetrics};
pub use queue::{
    ChannelExportQueue, ChannelExportReceiver, ExportProducer, ExportPublisher, ExportSubscriber,
    KafkaExportPublisher, KafkaExportSubscriber, QueueMessage,
};
