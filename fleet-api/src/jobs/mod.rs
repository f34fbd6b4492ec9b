//! Background Jobs for the fleet API
//!
//! - `export_worker`: consumes export jobs and uploads rendered spreadsheets
//!
//! The worker is spawned by the `fleet-exporter` binary:
//!
//! ```ignore
//! use fleet_api::jobs::{export_worker_task, ExportWorker};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let worker = Arc::new(ExportWorker::new(store, artifacts, storage, config));
//! tokio::spawn(export_worker_task(worker, Box::new(subscriber), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod export_worker;

pub use export_worker::{
    export_worker_task, ExportReceipt, ExportStage, ExportWorker, ExportWorkerMetrics,
    ExportWorkerSnapshot,
};
