//! Bulk Import Processor
//!
//! An upload is written to `{upload_dir}/{user}_{filename}`, parsed, validated
//! as a whole and inserted as one batch. Any invalid row fails the import
//! before anything is written to the store. The uploaded file is removed
//! afterwards, whatever the outcome.

use fleet_core::{parse_sheet, FleetError, FleetResult, ImportReport, TransferError, UserId};
use fleet_storage::InventoryStore;
use futures_util::Stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ImportConfig;
use crate::file_storage::LocalFileStore;
use crate::spreadsheet::read_rows;
use crate::telemetry::with_metrics;

pub struct ImportProcessor {
    store: Arc<dyn InventoryStore>,
    uploads: LocalFileStore,
}

impl ImportProcessor {
    pub fn new(store: Arc<dyn InventoryStore>, config: &ImportConfig) -> Self {
        Self {
            store,
            uploads: LocalFileStore::new(&config.upload_dir),
        }
    }

    fn upload_name(user: UserId, filename: &str) -> FleetResult<String> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(FleetError::invalid("filename", "must not be empty"));
        }
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(FleetError::invalid("filename", "must be a plain file name"));
        }
        Ok(format!("{}_{}", user, filename))
    }

    /// Where an upload from `user` named `filename` is materialized.
    pub fn upload_path(&self, user: UserId, filename: &str) -> FleetResult<PathBuf> {
        self.uploads.resolve(&Self::upload_name(user, filename)?)
    }

    /// Materialize a streamed upload, then import it.
    pub async fn import_stream<S>(
        &self,
        user: UserId,
        filename: &str,
        chunks: S,
    ) -> FleetResult<ImportReport>
    where
        S: Stream<Item = FleetResult<Vec<u8>>> + Send,
    {
        let name = Self::upload_name(user, filename)?;
        let ack = self.uploads.write_chunks(&name, chunks).await?;
        let path = self.uploads.resolve(&name)?;
        tracing::debug!(user, filename, bytes = ack.bytes_written, "Upload received");

        let result = self.import_file(user, &path).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
        }
        result
    }

    /// Parse, validate and batch-insert a spreadsheet already on disk.
    pub async fn import_file(&self, user: UserId, path: &Path) -> FleetResult<ImportReport> {
        let owned = path.to_path_buf();
        let rows = tokio::task::spawn_blocking(move || read_rows(&owned))
            .await
            .map_err(|e| TransferError::Spreadsheet {
                reason: format!("parse task failed: {}", e),
            })??;

        let candidates = match parse_sheet(rows, user) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(user, error = %e, "Rejected import");
                return Err(e);
            }
        };

        let report = self.store.create_batch(user, candidates).await?;
        with_metrics(|m| m.record_import(report.imported.len(), report.failed.len()));
        tracing::info!(
            user,
            imported = report.num_imported(),
            failed = report.num_failed(),
            "Import completed"
        );
        Ok(report)
    }
}
