//! Async store contracts for the inventory and for export file artifacts.
//!
//! Both the PostgreSQL client and the in-memory mocks implement these traits,
//! and the cache-aside proxy wraps any [`InventoryStore`] in another one.

use ::async_trait::async_trait;
use fleet_core::{
    FileArtifact, FileId, FileStatus, FleetResult, ImportReport, NewServer, ServerId, ServerPatch,
    ServerQuery, ServerRecord, UserId,
};

/// System of record for server records.
///
/// Soft-deleted records are invisible to every read. Implementations must
/// reject a second live record with the same name.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // ========================================================================
    // READS
    // ========================================================================

    /// Run a resolved list query.
    async fn find(&self, query: &ServerQuery) -> FleetResult<Vec<ServerRecord>>;

    /// Count the records matching the query's search text and filter.
    /// Pagination and ordering are ignored.
    async fn count(&self, query: &ServerQuery) -> FleetResult<i64>;

    async fn find_by_id(&self, id: ServerId) -> FleetResult<Option<ServerRecord>>;

    async fn find_by_name(&self, name: &str) -> FleetResult<Option<ServerRecord>>;

    /// True when a record with the candidate's id, or a live record with its
    /// name, is already stored.
    async fn exists(&self, candidate: &NewServer) -> FleetResult<bool>;

    // ========================================================================
    // WRITES
    // ========================================================================

    async fn create(&self, server: NewServer) -> FleetResult<ServerRecord>;

    async fn update_by_id(&self, id: ServerId, patch: ServerPatch) -> FleetResult<ServerRecord>;

    async fn update_by_name(&self, name: &str, patch: ServerPatch) -> FleetResult<ServerRecord>;

    /// Soft delete, stamping `deleted_at` and `deleted_by`.
    async fn delete_by_id(&self, id: ServerId, actor: Option<UserId>)
        -> FleetResult<ServerRecord>;

    async fn delete_by_name(&self, name: &str, actor: Option<UserId>)
        -> FleetResult<ServerRecord>;

    /// Insert every candidate that does not collide with a stored record or
    /// with an earlier candidate of the same batch, in one write.
    async fn create_batch(
        &self,
        actor: UserId,
        candidates: Vec<NewServer>,
    ) -> FleetResult<ImportReport>;
}

/// Durable records of generated export files.
#[async_trait]
pub trait FileArtifactStore: Send + Sync {
    async fn create_artifact(&self, artifact: &FileArtifact) -> FleetResult<()>;

    /// Move an artifact to a new status, stamping `updated_at`.
    async fn set_artifact_status(&self, id: FileId, status: FileStatus)
        -> FleetResult<FileArtifact>;

    async fn get_artifact(&self, id: FileId) -> FleetResult<Option<FileArtifact>>;

    /// Artifacts owned by a user, newest first.
    async fn list_artifacts(&self, owner: UserId) -> FleetResult<Vec<FileArtifact>>;
}
