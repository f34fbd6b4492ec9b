//! Fleet API Server Entry Point
//!
//! Bootstraps configuration, connects PostgreSQL, Redis and Kafka, and
//! serves `ServerService` over gRPC with `/metrics` on the admin port.

use std::net::SocketAddr;
use std::sync::Arc;

use fleet_api::grpc::proto::server_service_server::ServerServiceServer;
use fleet_api::telemetry::{admin_router, init_tracing, TelemetryConfig};
use fleet_api::{
    ApiError, ApiResult, CacheSettings, CachedInventory, DbClient, DbConfig, ExportProducer,
    ImportConfig, ImportProcessor, KafkaExportPublisher, QueueConfig, RolePolicy,
    ServerServiceImpl, ServiceConfig,
};
use fleet_storage::{InventoryStore, RedisQueryCache};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let service_config = ServiceConfig::from_env();
    init_tracing(&TelemetryConfig::for_service(&service_config.service_name))?;

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;
    if db_config.auto_migrate {
        db.apply_schema().await?;
    }

    let cache_settings = CacheSettings::from_env();
    let cache = RedisQueryCache::connect(&cache_settings.redis_url, cache_settings.cache_config()).await?;
    let store: Arc<dyn InventoryStore> =
        Arc::new(CachedInventory::new(Arc::new(db), Arc::new(cache)));

    let queue_config = QueueConfig::from_env();
    let exports = ExportProducer::new(Arc::new(KafkaExportPublisher::new(&queue_config)?));

    let importer = Arc::new(ImportProcessor::new(store.clone(), &ImportConfig::from_env()));

    let servers = ServerServiceImpl::new(store, importer, exports, Arc::new(RolePolicy));

    let grpc_addr = parse_addr(&service_config.grpc_addr())?;
    let admin_addr = parse_addr(&service_config.admin_addr())?;

    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", admin_addr, e)))?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(admin_listener, admin_router()).await {
            tracing::error!(error = %e, "Admin server stopped");
        }
    });

    tracing::info!(
        %grpc_addr,
        %admin_addr,
        environment = %service_config.environment,
        "Starting fleet API server"
    );

    tonic::transport::Server::builder()
        .add_service(ServerServiceServer::new(servers))
        .serve_with_shutdown(grpc_addr, shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Fleet API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

fn parse_addr(addr: &str) -> ApiResult<SocketAddr> {
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
