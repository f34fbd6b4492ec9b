//! Fleet File Storage Entry Point
//!
//! Serves `FileService`: streamed uploads under a local root, chunked
//! downloads, and the export artifact listing from PostgreSQL.

use std::net::SocketAddr;
use std::sync::Arc;

use fleet_api::constants::DEFAULT_EXPORT_CHUNK_SIZE;
use fleet_api::grpc::proto::file_service_server::FileServiceServer;
use fleet_api::telemetry::{init_tracing, TelemetryConfig};
use fleet_api::{
    ApiError, ApiResult, DbClient, DbConfig, FileServerConfig, FileServiceImpl, LocalFileStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::for_service("fleet-files"))?;

    let config = FileServerConfig::from_env();
    tokio::fs::create_dir_all(&config.root).await.map_err(|e| {
        ApiError::internal_error(format!(
            "Failed to create storage root {}: {}",
            config.root.display(),
            e
        ))
    })?;

    let artifacts = Arc::new(DbClient::from_config(&DbConfig::from_env())?);
    let files = FileServiceImpl::new(
        LocalFileStore::new(&config.root),
        artifacts,
        DEFAULT_EXPORT_CHUNK_SIZE,
    );

    let raw_addr = config.socket_addr();
    let addr = raw_addr
        .parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", raw_addr, e)))?;
    tracing::info!(%addr, root = %config.root.display(), "Starting fleet file server");

    tonic::transport::Server::builder()
        .add_service(FileServiceServer::new(files))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
    Ok(())
}
