//! In-memory stores for tests and local runs.

use crate::{FileArtifactStore, InventoryStore};
use ::async_trait::async_trait;
use chrono::Utc;
use fleet_core::{
    EntityKind, FileArtifact, FileId, FileStatus, FleetError, FleetResult, ImportReport,
    NewServer, ServerId, ServerPatch, ServerQuery, ServerRecord, StorageError, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Records = HashMap<ServerId, ServerRecord>;

/// In-memory inventory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MockInventory {
    records: Arc<RwLock<Records>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records directly, bypassing validation.
    pub fn with_records(records: impl IntoIterator<Item = ServerRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            records: Arc::new(RwLock::new(map)),
        }
    }

    pub fn clear(&self) -> FleetResult<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> FleetResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> FleetResult<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Number of records visible to reads.
    pub fn live_count(&self) -> FleetResult<usize> {
        Ok(self.read()?.values().filter(|r| !r.is_deleted()).count())
    }

    fn read(&self) -> FleetResult<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> FleetResult<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

fn live_id_by_name(records: &Records, name: &str) -> Option<ServerId> {
    records
        .values()
        .find(|r| !r.is_deleted() && r.name == name)
        .map(|r| r.id)
}

fn collides(records: &Records, candidate: &NewServer) -> bool {
    candidate.id.is_some_and(|id| records.contains_key(&id))
        || live_id_by_name(records, &candidate.name).is_some()
}

fn update_locked(
    records: &mut Records,
    id: ServerId,
    patch: &ServerPatch,
) -> FleetResult<ServerRecord> {
    if let Some(name) = &patch.name {
        if live_id_by_name(records, name).is_some_and(|other| other != id) {
            return Err(FleetError::server_exists(name.clone()));
        }
    }
    let record = records
        .get_mut(&id)
        .filter(|r| !r.is_deleted())
        .ok_or_else(|| FleetError::server_not_found(id.to_string()))?;
    record.apply(patch, Utc::now());
    Ok(record.clone())
}

fn delete_locked(
    records: &mut Records,
    id: ServerId,
    actor: Option<UserId>,
) -> FleetResult<ServerRecord> {
    let record = records
        .get_mut(&id)
        .filter(|r| !r.is_deleted())
        .ok_or_else(|| FleetError::server_not_found(id.to_string()))?;
    record.deleted_at = Some(Utc::now());
    record.deleted_by = actor;
    Ok(record.clone())
}

#[async_trait]
impl InventoryStore for MockInventory {
    async fn find(&self, query: &ServerQuery) -> FleetResult<Vec<ServerRecord>> {
        let matching = self
            .read()?
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Ok(query.apply_window(matching))
    }

    async fn count(&self, query: &ServerQuery) -> FleetResult<i64> {
        Ok(self.read()?.values().filter(|r| query.matches(r)).count() as i64)
    }

    async fn find_by_id(&self, id: ServerId) -> FleetResult<Option<ServerRecord>> {
        Ok(self.read()?.get(&id).filter(|r| !r.is_deleted()).cloned())
    }

    async fn find_by_name(&self, name: &str) -> FleetResult<Option<ServerRecord>> {
        let records = self.read()?;
        Ok(live_id_by_name(&records, name).and_then(|id| records.get(&id).cloned()))
    }

    async fn exists(&self, candidate: &NewServer) -> FleetResult<bool> {
        Ok(collides(&*self.read()?, candidate))
    }

    async fn create(&self, server: NewServer) -> FleetResult<ServerRecord> {
        server.validate()?;
        let mut records = self.write()?;
        if live_id_by_name(&records, &server.name).is_some() {
            return Err(FleetError::server_exists(server.name));
        }
        if let Some(id) = server.id.filter(|id| records.contains_key(id)) {
            return Err(FleetError::server_exists(id.to_string()));
        }
        let record = server.into_record(Utc::now());
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_by_id(&self, id: ServerId, patch: ServerPatch) -> FleetResult<ServerRecord> {
        patch.validate()?;
        update_locked(&mut *self.write()?, id, &patch)
    }

    async fn update_by_name(&self, name: &str, patch: ServerPatch) -> FleetResult<ServerRecord> {
        patch.validate()?;
        let mut records = self.write()?;
        let id = live_id_by_name(&records, name)
            .ok_or_else(|| FleetError::server_not_found(name.to_string()))?;
        update_locked(&mut records, id, &patch)
    }

    async fn delete_by_id(
        &self,
        id: ServerId,
        actor: Option<UserId>,
    ) -> FleetResult<ServerRecord> {
        delete_locked(&mut *self.write()?, id, actor)
    }

    async fn delete_by_name(
        &self,
        name: &str,
        actor: Option<UserId>,
    ) -> FleetResult<ServerRecord> {
        let mut records = self.write()?;
        let id = live_id_by_name(&records, name)
            .ok_or_else(|| FleetError::server_not_found(name.to_string()))?;
        delete_locked(&mut records, id, actor)
    }

    async fn create_batch(
        &self,
        actor: UserId,
        candidates: Vec<NewServer>,
    ) -> FleetResult<ImportReport> {
        for candidate in &candidates {
            candidate.validate()?;
        }

        let mut records = self.write()?;
        let mut report = ImportReport::default();
        let mut batch_ids = HashSet::new();
        let mut batch_names = HashSet::new();
        let now = Utc::now();

        for mut candidate in candidates {
            let in_batch = candidate.id.is_some_and(|id| batch_ids.contains(&id))
                || batch_names.contains(&candidate.name);
            if in_batch || collides(&records, &candidate) {
                report.failed.push(candidate);
                continue;
            }
            if let Some(id) = candidate.id {
                batch_ids.insert(id);
            }
            batch_names.insert(candidate.name.clone());
            candidate.created_by = Some(actor);
            report.imported.push(candidate.into_record(now));
        }

        for record in &report.imported {
            records.insert(record.id, record.clone());
        }
        Ok(report)
    }
}

/// In-memory file artifact store.
#[derive(Debug, Clone, Default)]
pub struct MockFileArtifacts {
    artifacts: Arc<RwLock<HashMap<FileId, FileArtifact>>>,
}

impl MockFileArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every artifact, in no particular order.
    pub fn all(&self) -> FleetResult<Vec<FileArtifact>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| FleetError::from(StorageError::LockPoisoned))?;
        Ok(artifacts.values().cloned().collect())
    }
}

#[async_trait]
impl FileArtifactStore for MockFileArtifacts {
    async fn create_artifact(&self, artifact: &FileArtifact) -> FleetResult<()> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| FleetError::from(StorageError::LockPoisoned))?;
        if artifacts.contains_key(&artifact.id) {
            return Err(StorageError::AlreadyExists {
                entity: EntityKind::FileArtifact,
                key: artifact.id.to_string(),
            }
            .into());
        }
        artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn set_artifact_status(
        &self,
        id: FileId,
        status: FileStatus,
    ) -> FleetResult<FileArtifact> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| FleetError::from(StorageError::LockPoisoned))?;
        let artifact = artifacts.get_mut(&id).ok_or_else(|| {
            FleetError::from(StorageError::NotFound {
                entity: EntityKind::FileArtifact,
                key: id.to_string(),
            })
        })?;
        artifact.status = status;
        artifact.updated_at = Some(Utc::now());
        Ok(artifact.clone())
    }

    async fn get_artifact(&self, id: FileId) -> FleetResult<Option<FileArtifact>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| FleetError::from(StorageError::LockPoisoned))?;
        Ok(artifacts.get(&id).cloned())
    }

    async fn list_artifacts(&self, owner: UserId) -> FleetResult<Vec<FileArtifact>> {
        let mut owned: Vec<FileArtifact> = self
            .all()?
            .into_iter()
            .filter(|a| a.owner == owner)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned)
    }
}
