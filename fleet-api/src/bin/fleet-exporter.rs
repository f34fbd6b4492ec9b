//! Fleet Export Worker Entry Point
//!
//! Consumes export jobs from Kafka, renders them against PostgreSQL and
//! streams the spreadsheets to the file storage service.

use std::sync::Arc;

use fleet_api::telemetry::{init_tracing, TelemetryConfig};
use fleet_api::{
    export_worker_task, ApiResult, DbClient, DbConfig, ExportWorker, ExportWorkerConfig,
    GrpcFileStorage, KafkaExportSubscriber, QueueConfig,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::for_service("fleet-exporter"))?;

    let db = Arc::new(DbClient::from_config(&DbConfig::from_env())?);
    let worker_config = ExportWorkerConfig::from_env();
    let storage = Arc::new(GrpcFileStorage::new(worker_config.file_server_url.clone()));
    let worker = Arc::new(ExportWorker::new(db.clone(), db, storage, worker_config));

    let subscriber = KafkaExportSubscriber::new(&QueueConfig::from_env())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(export_worker_task(worker, Box::new(subscriber), shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    match handle.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                jobs_started = snapshot.jobs_started,
                jobs_exported = snapshot.jobs_exported,
                jobs_failed = snapshot.jobs_failed,
                "Export worker stopped"
            );
        }
        Err(e) => tracing::error!(error = %e, "Export worker panicked"),
    }
    Ok(())
}
