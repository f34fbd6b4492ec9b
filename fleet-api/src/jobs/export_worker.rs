//! Spreadsheet Export Worker
//!
//! Consumes export jobs from the export queue and, for each one:
//!
//! 1. runs the job's query against the store (never the cache)
//! 2. renders the rows to `Sheet1` of a temporary `.xlsx`
//! 3. records a [`FileArtifact`] in `Exporting` state
//! 4. streams the file to file storage in fixed-size chunks
//! 5. marks the artifact `Exported`, or `Fail` if anything after step 3 broke
//!
//! The temporary file is removed on every path. A failed job is logged and
//! counted; it is never retried and never stops the loop.
//!
//! # Example
//!
//! ```ignore
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let worker = Arc::new(ExportWorker::new(store, artifacts, storage, config));
//! let handle = tokio::spawn(export_worker_task(worker, Box::new(subscriber), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use chrono::Utc;
use fleet_core::{
    new_entity_id, ExportJob, FileArtifact, FileId, FileStatus, FleetResult, TransferError,
};
use fleet_storage::{FileArtifactStore, InventoryStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::ExportWorkerConfig;
use crate::file_storage::FileStorage;
use crate::queue::{ExportSubscriber, QueueMessage};
use crate::spreadsheet::render_servers;
use crate::telemetry::with_metrics;

/// Pause after a failed queue read before polling again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

// ============================================================================
// METRICS
// ============================================================================

/// Counters for one worker's lifetime.
#[derive(Debug, Default)]
pub struct ExportWorkerMetrics {
    /// Decodable jobs handed to a task
    pub jobs_started: AtomicU64,

    pub jobs_exported: AtomicU64,

    pub jobs_failed: AtomicU64,

    /// Rows written across all exported files
    pub rows_exported: AtomicU64,

    /// Messages that were not a valid export job
    pub undecodable_messages: AtomicU64,

    /// Failed reads or commits against the queue
    pub queue_errors: AtomicU64,
}

impl ExportWorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ExportWorkerSnapshot {
        ExportWorkerSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_exported: self.jobs_exported.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            rows_exported: self.rows_exported.load(Ordering::Relaxed),
            undecodable_messages: self.undecodable_messages.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWorkerSnapshot {
    pub jobs_started: u64,
    pub jobs_exported: u64,
    pub jobs_failed: u64,
    pub rows_exported: u64,
    pub undecodable_messages: u64,
    pub queue_errors: u64,
}

// ============================================================================
// SINGLE JOB
// ============================================================================

/// Stage a job has reached, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Queued,
    Rendering,
    Uploading,
    Exported,
    Failed,
}

impl ExportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Queued => "queued",
            ExportStage::Rendering => "rendering",
            ExportStage::Uploading => "uploading",
            ExportStage::Exported => "exported",
            ExportStage::Failed => "fail",
        }
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub artifact: FileArtifact,
    pub rows: usize,
}

/// Runs single export jobs. Cheap to share behind an `Arc`.
pub struct ExportWorker {
    store: Arc<dyn InventoryStore>,
    artifacts: Arc<dyn FileArtifactStore>,
    storage: Arc<dyn FileStorage>,
    config: ExportWorkerConfig,
}

impl ExportWorker {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        artifacts: Arc<dyn FileArtifactStore>,
        storage: Arc<dyn FileStorage>,
        config: ExportWorkerConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &ExportWorkerConfig {
        &self.config
    }

    /// `{temp_dir}/{user}_{file_id}_{file_name}`
    pub fn temp_path(&self, job: &ExportJob, file_id: FileId) -> PathBuf {
        self.config
            .temp_dir
            .join(format!("{}_{}_{}", job.user_id, file_id, job.file_name()))
    }

    /// Run one job to completion.
    pub async fn run_job(&self, job: &ExportJob) -> FleetResult<ExportReceipt> {
        let file_id = new_entity_id();
        let temp_path = self.temp_path(job, file_id);
        let result = self.export_to(job, file_id, &temp_path).await;
        remove_temp_file(&temp_path).await;
        result
    }

    async fn export_to(
        &self,
        job: &ExportJob,
        file_id: FileId,
        temp_path: &Path,
    ) -> FleetResult<ExportReceipt> {
        log_stage(job, file_id, ExportStage::Queued);
        let artifact = FileArtifact::exporting(file_id, job.user_id, job.file_name(), Utc::now());
        self.artifacts.create_artifact(&artifact).await?;

        match self.render_and_upload(job, &artifact, temp_path).await {
            Ok(receipt) => {
                log_stage(job, file_id, ExportStage::Exported);
                Ok(receipt)
            }
            Err(e) => {
                log_stage(job, file_id, ExportStage::Failed);
                self.mark_failed(file_id).await;
                Err(e)
            }
        }
    }

    /// Every step after the artifact exists; any error fails the artifact.
    async fn render_and_upload(
        &self,
        job: &ExportJob,
        artifact: &FileArtifact,
        temp_path: &Path,
    ) -> FleetResult<ExportReceipt> {
        log_stage(job, artifact.id, ExportStage::Rendering);
        let query = job.to_query()?;
        let records = self.store.find(&query).await?;
        let rows = self.render(records, temp_path).await?;

        log_stage(job, artifact.id, ExportStage::Uploading);
        let artifact = self.upload_and_finish(artifact, temp_path).await?;
        Ok(ExportReceipt { artifact, rows })
    }

    async fn render(&self, records: Vec<fleet_core::ServerRecord>, path: &Path) -> FleetResult<usize> {
        tokio::fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(|e| TransferError::Io {
                path: self.config.temp_dir.display().to_string(),
                reason: e.to_string(),
            })?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || render_servers(&records, &path))
            .await
            .map_err(|e| TransferError::Spreadsheet {
                reason: format!("render task failed: {}", e),
            })?
    }

    async fn upload_and_finish(
        &self,
        artifact: &FileArtifact,
        temp_path: &Path,
    ) -> FleetResult<FileArtifact> {
        let ack = self
            .storage
            .upload(&artifact.path, temp_path, self.config.chunk_size)
            .await?;
        tracing::debug!(
            file_id = %artifact.id,
            path = %ack.path,
            bytes = ack.bytes_written,
            "Upload acknowledged"
        );
        self.artifacts
            .set_artifact_status(artifact.id, FileStatus::Exported)
            .await
    }

    async fn mark_failed(&self, file_id: FileId) {
        if let Err(e) = self
            .artifacts
            .set_artifact_status(file_id, FileStatus::Fail)
            .await
        {
            tracing::error!(file_id = %file_id, error = %e, "Failed to mark artifact as failed");
        }
    }
}

fn log_stage(job: &ExportJob, file_id: FileId, stage: ExportStage) {
    tracing::debug!(
        user_id = job.user_id,
        file_id = %file_id,
        file_name = %job.file_name(),
        stage = stage.as_str(),
        "Export stage"
    );
}

async fn remove_temp_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary export file");
        }
    }
}

// ============================================================================
// CONSUMER LOOP
// ============================================================================

/// Consume export jobs until shutdown or until the queue ends.
///
/// Jobs run on spawned tasks, at most `max_concurrent_jobs` at a time. A
/// message is committed once its job has been handed off; undecodable
/// messages are committed and skipped. In-flight jobs are awaited before the
/// subscriber is closed.
pub async fn export_worker_task(
    worker: Arc<ExportWorker>,
    mut subscriber: Box<dyn ExportSubscriber>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ExportWorkerMetrics> {
    let metrics = Arc::new(ExportWorkerMetrics::new());
    let permits = Arc::new(Semaphore::new(worker.config().max_concurrent_jobs.max(1)));
    let mut jobs = JoinSet::new();

    tracing::info!(
        max_concurrent_jobs = worker.config().max_concurrent_jobs,
        chunk_size = worker.config().chunk_size,
        temp_dir = %worker.config().temp_dir.display(),
        "Export worker started"
    );

    loop {
        let next = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Export worker shutting down");
                    break;
                }
                continue;
            }
            next = subscriber.next_message() => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!("Export queue closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read from export queue");
                metrics.queue_errors.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
                continue;
            }
        };

        let job = match decode_job(&message) {
            Some(job) => job,
            None => {
                metrics.undecodable_messages.fetch_add(1, Ordering::Relaxed);
                commit(subscriber.as_mut(), &message, &metrics).await;
                continue;
            }
        };

        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        metrics.jobs_started.fetch_add(1, Ordering::Relaxed);
        let task_worker = Arc::clone(&worker);
        let task_metrics = Arc::clone(&metrics);
        jobs.spawn(async move {
            let _permit = permit;
            process_job(&task_worker, &job, &task_metrics).await;
        });
        commit(subscriber.as_mut(), &message, &metrics).await;

        while let Some(done) = jobs.try_join_next() {
            if let Err(e) = done {
                tracing::error!(error = %e, "Export task panicked");
            }
        }
    }

    while let Some(done) = jobs.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "Export task panicked");
        }
    }
    if let Err(e) = subscriber.close().await {
        tracing::warn!(error = %e, "Failed to close export subscriber");
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        jobs_started = snapshot.jobs_started,
        jobs_exported = snapshot.jobs_exported,
        jobs_failed = snapshot.jobs_failed,
        rows_exported = snapshot.rows_exported,
        undecodable_messages = snapshot.undecodable_messages,
        queue_errors = snapshot.queue_errors,
        "Export worker stopped"
    );

    metrics
}

fn decode_job(message: &QueueMessage) -> Option<ExportJob> {
    match message.decode().and_then(|job| job.validate().map(|_| job)) {
        Ok(job) => Some(job),
        Err(e) => {
            tracing::warn!(
                partition = message.partition,
                offset = message.offset,
                key = ?message.key,
                error = %e,
                "Skipping undecodable export message"
            );
            None
        }
    }
}

async fn commit(
    subscriber: &mut dyn ExportSubscriber,
    message: &QueueMessage,
    metrics: &ExportWorkerMetrics,
) {
    if let Err(e) = subscriber.commit(message).await {
        tracing::error!(offset = message.offset, error = %e, "Failed to commit export message");
        metrics.queue_errors.fetch_add(1, Ordering::Relaxed);
    }
}

async fn process_job(worker: &ExportWorker, job: &ExportJob, metrics: &ExportWorkerMetrics) {
    match worker.run_job(job).await {
        Ok(receipt) => {
            metrics.jobs_exported.fetch_add(1, Ordering::Relaxed);
            metrics
                .rows_exported
                .fetch_add(receipt.rows as u64, Ordering::Relaxed);
            with_metrics(|m| m.record_export_job(ExportStage::Exported.as_str()));
            tracing::info!(
                user_id = job.user_id,
                file_id = %receipt.artifact.id,
                path = %receipt.artifact.path,
                rows = receipt.rows,
                "Export completed"
            );
        }
        Err(e) => {
            metrics.jobs_failed.fetch_add(1, Ordering::Relaxed);
            with_metrics(|m| m.record_export_job(ExportStage::Failed.as_str()));
            tracing::error!(
                user_id = job.user_id,
                file_name = %job.file_name(),
                error = %e,
                "Export failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_storage::{LocalFileStore, UploadAck};
    use crate::queue::{ChannelExportQueue, ExportProducer, ExportPublisher};
    use async_trait::async_trait;
    use fleet_core::{FleetError, ServerFilter, ServerStatus};
    use fleet_test_utils::fixtures::seeded_inventory;
    use fleet_test_utils::MockFileArtifacts;
    use tempfile::TempDir;

    struct RejectingStorage;

    #[async_trait]
    impl FileStorage for RejectingStorage {
        async fn upload(&self, _: &str, _: &Path, _: usize) -> FleetResult<UploadAck> {
            Err(TransferError::Upload {
                reason: "storage offline".into(),
            }
            .into())
        }
    }

    struct Harness {
        temp: TempDir,
        root: TempDir,
        artifacts: Arc<MockFileArtifacts>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                root: TempDir::new().unwrap(),
                artifacts: Arc::new(MockFileArtifacts::new()),
            }
        }

        fn worker(&self, storage: Arc<dyn FileStorage>) -> ExportWorker {
            ExportWorker::new(
                Arc::new(seeded_inventory(6)),
                self.artifacts.clone(),
                storage,
                ExportWorkerConfig::development(self.temp.path()),
            )
        }

        fn local(&self) -> Arc<dyn FileStorage> {
            Arc::new(LocalFileStore::new(self.root.path()))
        }

        fn temp_is_empty(&self) -> bool {
            std::fs::read_dir(self.temp.path()).unwrap().next().is_none()
        }
    }

    #[tokio::test]
    async fn test_job_exports_filtered_rows() {
        let h = Harness::new();
        let job = ExportJob::new(3, "on.xlsx").with_filter(ServerFilter::with_status(ServerStatus::On));

        let receipt = h.worker(h.local()).run_job(&job).await.unwrap();

        assert_eq!(receipt.rows, 3);
        assert_eq!(receipt.artifact.status, FileStatus::Exported);
        assert!(receipt.artifact.path.starts_with("3/"));
        assert!(h.root.path().join(&receipt.artifact.path).exists());
        assert!(h.temp_is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_marks_artifact_failed() {
        let h = Harness::new();
        let err = h
            .worker(Arc::new(RejectingStorage))
            .run_job(&ExportJob::new(3, "all.xlsx"))
            .await
            .unwrap_err();

        assert!(matches!(err, FleetError::Transfer(TransferError::Upload { .. })));
        let artifacts = h.artifacts.all().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, FileStatus::Fail);
        assert!(h.temp_is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_marks_artifact_failed() {
        let h = Harness::new();
        // A regular file where the temp directory should be.
        let blocker = h.temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let worker = ExportWorker::new(
            Arc::new(seeded_inventory(2)),
            h.artifacts.clone(),
            h.local(),
            ExportWorkerConfig::development(blocker.clone()),
        );

        let err = worker.run_job(&ExportJob::new(5, "blocked.xlsx")).await.unwrap_err();
        assert!(matches!(err, FleetError::Transfer(TransferError::Io { .. })));

        let artifacts = h.artifacts.all().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].owner, 5);
        assert_eq!(artifacts[0].status, FileStatus::Fail);
    }

    #[tokio::test]
    async fn test_task_skips_undecodable_and_drains_on_close() {
        let h = Harness::new();
        let worker = Arc::new(h.worker(h.local()));
        let (queue, receiver) = ChannelExportQueue::new("fleet.export", 8);
        let commits = receiver.commits();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        queue.publish("broken", b"{broken".to_vec()).await.unwrap();
        ExportProducer::new(Arc::new(queue.clone()))
            .submit(&ExportJob::new(1, "a.xlsx"))
            .await
            .unwrap();
        drop(queue);

        let metrics = export_worker_task(worker, Box::new(receiver), shutdown_rx).await;
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.undecodable_messages, 1);
        assert_eq!(snapshot.jobs_exported, 1);
        assert_eq!(commits.offsets(), vec![0, 1]);
        assert_eq!(h.artifacts.all().unwrap()[0].status, FileStatus::Exported);
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown() {
        let h = Harness::new();
        let worker = Arc::new(h.worker(h.local()));
        let (_queue, receiver) = ChannelExportQueue::new("fleet.export", 1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(export_worker_task(worker, Box::new(receiver), shutdown_rx));
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();
        assert_eq!(metrics.snapshot().jobs_started, 0);
    }
}
