//! gRPC Service Implementation
//!
//! Implements `ServerService` and `FileService` from proto/fleet.proto.
//!
//! Every `ServerService` call reads the caller's role and user id from
//! request metadata and checks it against the [`Authorizer`] before touching
//! the store. List reads go through whatever store the service was built
//! with; in deployment that is the cache-aside [`crate::cached_db::CachedInventory`].

use std::pin::Pin;
use std::sync::Arc;

use fleet_core::{
    ExportJob, ExportPagination, FileArtifact, FleetError, ImportReport, ListServersRequest,
    NewServer, Pagination, ServerFilter, ServerId, ServerPatch, ServerRecord, ServerStatus,
    SortDirection, TransferError, UserId,
};
use fleet_storage::{FileArtifactStore, InventoryStore};
use futures_util::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::auth::{metadata_str, Action, Authorizer, CallerContext};
use crate::constants::{FILENAME_METADATA_KEY, PATH_METADATA_KEY, USER_METADATA_KEY};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::file_storage::LocalFileStore;
use crate::import::ImportProcessor;
use crate::queue::ExportProducer;
use crate::telemetry::with_metrics;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("fleet");
}

use proto::{
    file_service_server::FileService, server_service_server::ServerService,
    CountServersResponse, CreateServerRequest, DeleteServerByIdRequest,
    DeleteServerByNameRequest, DownloadRequest, ExportServerRequest, ExportServerResponse,
    FileChunk, GetServerByIdRequest, GetServerByNameRequest, ImportServerResponse,
    ListFilesRequest, ListFilesResponse, ListServersResponse, ServerResponse, UpdateServerByNameRequest,
    UpdateServerRequest, UploadAck,
};

// ============================================================================
// CONVERSION HELPERS
// ============================================================================

/// Convert ApiError to tonic Status
impl From<ApiError> for Status {
    fn from(err: ApiError) -> Self {
        match err.code {
            ErrorCode::PermissionDenied => Status::permission_denied(err.message),
            ErrorCode::InvalidInput => Status::invalid_argument(err.message),
            ErrorCode::MissingField => Status::invalid_argument(err.message),
            ErrorCode::InvalidFormat => Status::invalid_argument(err.message),
            ErrorCode::EntityNotFound => Status::not_found(err.message),
            ErrorCode::EntityAlreadyExists => Status::already_exists(err.message),
            ErrorCode::Aborted => Status::aborted(err.message),
            ErrorCode::InternalError => Status::internal(err.message),
            ErrorCode::DatabaseError => Status::internal(err.message),
            ErrorCode::CacheError => Status::internal(err.message),
            ErrorCode::QueueError => Status::internal(err.message),
            ErrorCode::UpstreamError => Status::unavailable(err.message),
            ErrorCode::ServiceUnavailable => Status::unavailable(err.message),
            ErrorCode::ConnectionPoolExhausted => Status::resource_exhausted(err.message),
            ErrorCode::Timeout => Status::deadline_exceeded(err.message),
        }
    }
}

/// Record the outcome of an RPC and convert it for tonic.
fn respond<T>(method: &'static str, result: ApiResult<T>) -> Result<Response<T>, Status> {
    with_metrics(|m| m.record_rpc(method, result.is_ok()));
    match result {
        Ok(body) => {
            tracing::info!(method, "RPC handled");
            Ok(Response::new(body))
        }
        Err(err) => {
            if err.status_code().is_server_error() {
                tracing::error!(method, code = ?err.code, message = %err.message, "RPC failed");
            } else {
                tracing::warn!(method, code = ?err.code, message = %err.message, "RPC rejected");
            }
            Err(err.into())
        }
    }
}

fn parse_server_id(raw: &str) -> ApiResult<ServerId> {
    raw.parse::<ServerId>()
        .map_err(|_| ApiError::invalid_format("id", "UUID"))
}

fn status_from_proto(value: i32) -> ApiResult<ServerStatus> {
    match proto::ServerStatus::try_from(value) {
        Ok(proto::ServerStatus::On) => Ok(ServerStatus::On),
        Ok(proto::ServerStatus::Off) => Ok(ServerStatus::Off),
        Ok(proto::ServerStatus::None) => Ok(ServerStatus::None),
        Err(_) => Err(ApiError::invalid_input(format!("Unknown server status {}", value))),
    }
}

fn status_to_proto(status: ServerStatus) -> i32 {
    match status {
        ServerStatus::On => proto::ServerStatus::On as i32,
        ServerStatus::Off => proto::ServerStatus::Off as i32,
        ServerStatus::None => proto::ServerStatus::None as i32,
    }
}

fn sort_from_proto(value: i32) -> ApiResult<SortDirection> {
    match proto::SortDirection::try_from(value) {
        Ok(proto::SortDirection::Asc) => Ok(SortDirection::Asc),
        Ok(proto::SortDirection::Desc) => Ok(SortDirection::Desc),
        Ok(proto::SortDirection::None) => Ok(SortDirection::None),
        Err(_) => Err(ApiError::invalid_input(format!("Unknown sort direction {}", value))),
    }
}

fn filter_from_proto(filter: proto::ServerFilter) -> ApiResult<ServerFilter> {
    let status = status_from_proto(filter.status)?;
    Ok(ServerFilter {
        created_at_from: filter.created_at_from,
        created_at_to: filter.created_at_to,
        updated_at_from: filter.updated_at_from,
        updated_at_to: filter.updated_at_to,
        status: status.is_set().then_some(status),
    })
}

fn list_request_from_proto(req: proto::ListServersRequest) -> ApiResult<ListServersRequest> {
    let pagination = req
        .pagination
        .map(|p| -> ApiResult<Pagination> {
            Ok(Pagination {
                limit: p.limit,
                page: p.page,
                page_size: p.page_size,
                sort_by: p.sort_by,
                sort: sort_from_proto(p.sort)?,
            })
        })
        .transpose()?;
    Ok(ListServersRequest {
        query: req.query.filter(|q| !q.is_empty()),
        filter: req.filter.map(filter_from_proto).transpose()?,
        pagination,
    })
}

fn export_job_from_proto(user_id: UserId, req: ExportServerRequest) -> ApiResult<ExportJob> {
    let mut job = ExportJob::new(user_id, req.file_name);
    if let Some(filter) = req.filter {
        job = job.with_filter(filter_from_proto(filter)?);
    }
    if let Some(p) = req.pagination {
        job = job.with_pagination(ExportPagination {
            page_size: p.page_size,
            from_page: p.from_page,
            to_page: p.to_page,
            sort_by: p.sort_by,
            sort: sort_from_proto(p.sort)?,
        });
    }
    Ok(job)
}

fn server_to_proto(record: &ServerRecord) -> proto::Server {
    proto::Server {
        id: record.id.to_string(),
        name: record.name.clone(),
        ipv4: record.ipv4.clone(),
        status: status_to_proto(record.status),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.map(|t| t.to_rfc3339()),
        created_by: record.created_by,
        updated_by: record.updated_by,
        deleted_at: record.deleted_at.map(|t| t.to_rfc3339()),
        deleted_by: record.deleted_by,
    }
}

fn server_response(record: &ServerRecord) -> ServerResponse {
    ServerResponse {
        server: Some(server_to_proto(record)),
    }
}

fn candidate_to_proto(candidate: &NewServer) -> CreateServerRequest {
    CreateServerRequest {
        id: candidate.id.map(|id| id.to_string()),
        name: candidate.name.clone(),
        ipv4: candidate.ipv4.clone(),
        status: status_to_proto(candidate.status),
    }
}

fn report_to_proto(report: &ImportReport) -> ImportServerResponse {
    ImportServerResponse {
        num_imported: report.num_imported(),
        imported: report.imported.iter().map(server_to_proto).collect(),
        num_failed: report.num_failed(),
        failed: report.failed.iter().map(candidate_to_proto).collect(),
    }
}

fn artifact_to_proto(artifact: &FileArtifact) -> proto::FileArtifact {
    proto::FileArtifact {
        id: artifact.id.to_string(),
        file_name: artifact.file_name.clone(),
        path: artifact.path.clone(),
        status: artifact.status.to_string(),
        owner: artifact.owner,
        created_at: artifact.created_at.to_rfc3339(),
        updated_at: artifact.updated_at.map(|t| t.to_rfc3339()),
    }
}

fn patch_from_parts(
    name: Option<String>,
    ipv4: Option<String>,
    status: Option<i32>,
    actor: UserId,
) -> ApiResult<ServerPatch> {
    let mut patch = ServerPatch::new().by(actor);
    if let Some(name) = name {
        patch = patch.with_name(name);
    }
    if let Some(ipv4) = ipv4 {
        patch = patch.with_ipv4(ipv4);
    }
    if let Some(status) = status {
        patch = patch.with_status(status_from_proto(status)?);
    }
    patch.validate()?;
    Ok(patch)
}

// ============================================================================
// SERVER SERVICE IMPLEMENTATION
// ============================================================================

pub struct ServerServiceImpl {
    store: Arc<dyn InventoryStore>,
    importer: Arc<ImportProcessor>,
    exports: ExportProducer,
    authorizer: Arc<dyn Authorizer>,
}

impl ServerServiceImpl {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        importer: Arc<ImportProcessor>,
        exports: ExportProducer,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            store,
            importer,
            exports,
            authorizer,
        }
    }

    fn caller<T>(&self, request: &Request<T>, action: Action) -> ApiResult<CallerContext> {
        let caller = CallerContext::from_metadata(request.metadata())?;
        caller.require(self.authorizer.as_ref(), action)?;
        Ok(caller)
    }

    async fn list(&self, request: Request<proto::ListServersRequest>) -> ApiResult<ListServersResponse> {
        self.caller(&request, Action::View)?;
        let query = list_request_from_proto(request.into_inner())?.resolve()?;
        let servers = self.store.find(&query).await?;
        let total = self.store.count(&query).await?;
        tracing::info!(rows = servers.len(), total, "Listed servers");
        Ok(ListServersResponse {
            servers: servers.iter().map(server_to_proto).collect(),
            total,
        })
    }

    async fn count(&self, request: Request<proto::ListServersRequest>) -> ApiResult<CountServersResponse> {
        self.caller(&request, Action::View)?;
        let query = list_request_from_proto(request.into_inner())?.resolve()?;
        let count = self.store.count(&query).await?;
        Ok(CountServersResponse { count })
    }

    async fn get_by_id(&self, request: Request<GetServerByIdRequest>) -> ApiResult<ServerResponse> {
        self.caller(&request, Action::View)?;
        let req = request.into_inner();
        let id = parse_server_id(&req.id)?;
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| FleetError::server_not_found(req.id))?;
        Ok(server_response(&record))
    }

    async fn get_by_name(&self, request: Request<GetServerByNameRequest>) -> ApiResult<ServerResponse> {
        self.caller(&request, Action::View)?;
        let req = request.into_inner();
        let record = self
            .store
            .find_by_name(&req.name)
            .await?
            .ok_or_else(|| FleetError::server_not_found(req.name))?;
        Ok(server_response(&record))
    }

    async fn create(&self, request: Request<CreateServerRequest>) -> ApiResult<ServerResponse> {
        let caller = self.caller(&request, Action::Create)?;
        let req = request.into_inner();
        let mut server = NewServer::new(req.name, req.ipv4)
            .with_status(status_from_proto(req.status)?)
            .by(caller.user_id);
        if let Some(raw) = req.id.filter(|id| !id.is_empty()) {
            server = server.with_id(parse_server_id(&raw)?);
        }
        server.validate()?;
        let record = self.store.create(server).await?;
        tracing::info!(server_id = %record.id, name = %record.name, user_id = caller.user_id, "Created server");
        Ok(server_response(&record))
    }

    async fn update_by_id(&self, request: Request<UpdateServerRequest>) -> ApiResult<ServerResponse> {
        let caller = self.caller(&request, Action::Update)?;
        let req = request.into_inner();
        let id = parse_server_id(&req.id)?;
        let patch = patch_from_parts(req.name, req.ipv4, req.status, caller.user_id)?;
        let record = self.store.update_by_id(id, patch).await?;
        tracing::info!(server_id = %record.id, user_id = caller.user_id, "Updated server");
        Ok(server_response(&record))
    }

    async fn update_by_name(&self, request: Request<UpdateServerByNameRequest>) -> ApiResult<ServerResponse> {
        let caller = self.caller(&request, Action::Update)?;
        let req = request.into_inner();
        let patch = patch_from_parts(req.new_name, req.ipv4, req.status, caller.user_id)?;
        let record = self.store.update_by_name(&req.name, patch).await?;
        tracing::info!(server_id = %record.id, user_id = caller.user_id, "Updated server");
        Ok(server_response(&record))
    }

    async fn delete_by_id(&self, request: Request<DeleteServerByIdRequest>) -> ApiResult<ServerResponse> {
        let caller = self.caller(&request, Action::Delete)?;
        let id = parse_server_id(&request.into_inner().id)?;
        let record = self.store.delete_by_id(id, Some(caller.user_id)).await?;
        tracing::info!(server_id = %record.id, user_id = caller.user_id, "Deleted server");
        Ok(server_response(&record))
    }

    async fn delete_by_name(&self, request: Request<DeleteServerByNameRequest>) -> ApiResult<ServerResponse> {
        let caller = self.caller(&request, Action::Delete)?;
        let name = request.into_inner().name;
        let record = self.store.delete_by_name(&name, Some(caller.user_id)).await?;
        tracing::info!(server_id = %record.id, user_id = caller.user_id, "Deleted server");
        Ok(server_response(&record))
    }

    async fn import(&self, request: Request<Streaming<FileChunk>>) -> ApiResult<ImportServerResponse> {
        self.caller(&request, Action::Import)?;
        let metadata = request.metadata();
        let filename = metadata_str(metadata, FILENAME_METADATA_KEY)
            .map_err(|_| ApiError::missing_field(FILENAME_METADATA_KEY))?
            .to_string();
        let user = metadata_str(metadata, USER_METADATA_KEY)
            .map_err(|_| ApiError::missing_field(USER_METADATA_KEY))?
            .parse::<UserId>()
            .map_err(|_| ApiError::invalid_format(USER_METADATA_KEY, "integer"))?;
        tracing::info!(user, filename = %filename, "Import started");

        let chunks = request.into_inner().map(|chunk| {
            chunk.map(|c| c.content).map_err(|status| {
                FleetError::from(TransferError::Upload {
                    reason: status.message().to_string(),
                })
            })
        });
        let report = self.importer.import_stream(user, &filename, chunks).await?;
        Ok(report_to_proto(&report))
    }

    async fn export(&self, request: Request<ExportServerRequest>) -> ApiResult<ExportServerResponse> {
        let caller = self.caller(&request, Action::Export)?;
        let job = export_job_from_proto(caller.user_id, request.into_inner())?;
        self.exports.submit(&job).await?;
        Ok(ExportServerResponse {
            file_name: job.file_name().to_string(),
            topic: self.exports.topic().to_string(),
        })
    }
}

#[tonic::async_trait]
impl ServerService for ServerServiceImpl {
    async fn list_servers(
        &self,
        request: Request<proto::ListServersRequest>,
    ) -> Result<Response<ListServersResponse>, Status> {
        respond("ListServers", self.list(request).await)
    }

    async fn count_servers(
        &self,
        request: Request<proto::ListServersRequest>,
    ) -> Result<Response<CountServersResponse>, Status> {
        respond("CountServers", self.count(request).await)
    }

    async fn get_server_by_id(
        &self,
        request: Request<GetServerByIdRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("GetServerById", self.get_by_id(request).await)
    }

    async fn get_server_by_name(
        &self,
        request: Request<GetServerByNameRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("GetServerByName", self.get_by_name(request).await)
    }

    async fn create_server(
        &self,
        request: Request<CreateServerRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("CreateServer", self.create(request).await)
    }

    async fn update_server(
        &self,
        request: Request<UpdateServerRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("UpdateServer", self.update_by_id(request).await)
    }

    async fn update_server_by_name(
        &self,
        request: Request<UpdateServerByNameRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("UpdateServerByName", self.update_by_name(request).await)
    }

    async fn delete_server_by_id(
        &self,
        request: Request<DeleteServerByIdRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("DeleteServerById", self.delete_by_id(request).await)
    }

    async fn delete_server_by_name(
        &self,
        request: Request<DeleteServerByNameRequest>,
    ) -> Result<Response<ServerResponse>, Status> {
        respond("DeleteServerByName", self.delete_by_name(request).await)
    }

    async fn import_server(
        &self,
        request: Request<Streaming<FileChunk>>,
    ) -> Result<Response<ImportServerResponse>, Status> {
        respond("ImportServer", self.import(request).await)
    }

    async fn export_server(
        &self,
        request: Request<ExportServerRequest>,
    ) -> Result<Response<ExportServerResponse>, Status> {
        respond("ExportServer", self.export(request).await)
    }
}

// ============================================================================
// FILE SERVICE IMPLEMENTATION
// ============================================================================

pub struct FileServiceImpl {
    files: LocalFileStore,
    artifacts: Arc<dyn FileArtifactStore>,
    chunk_size: usize,
}

impl FileServiceImpl {
    pub fn new(files: LocalFileStore, artifacts: Arc<dyn FileArtifactStore>, chunk_size: usize) -> Self {
        Self {
            files,
            artifacts,
            chunk_size,
        }
    }

    async fn upload(&self, request: Request<Streaming<FileChunk>>) -> ApiResult<UploadAck> {
        let path = metadata_str(request.metadata(), PATH_METADATA_KEY)
            .map_err(|_| ApiError::missing_field(PATH_METADATA_KEY))?
            .to_string();
        let chunks = request.into_inner().map(|chunk| {
            chunk.map(|c| c.content).map_err(|status| {
                FleetError::from(TransferError::Upload {
                    reason: status.message().to_string(),
                })
            })
        });
        let ack = self.files.write_chunks(&path, chunks).await?;
        tracing::info!(path = %ack.path, bytes = ack.bytes_written, "Stored upload");
        Ok(UploadAck {
            path: ack.path,
            bytes_written: i64::try_from(ack.bytes_written).unwrap_or(i64::MAX),
        })
    }

    async fn list(&self, request: Request<ListFilesRequest>) -> ApiResult<ListFilesResponse> {
        let owner = request.into_inner().owner;
        let files = self.artifacts.list_artifacts(owner).await?;
        Ok(ListFilesResponse {
            files: files.iter().map(artifact_to_proto).collect(),
        })
    }
}

#[tonic::async_trait]
impl FileService for FileServiceImpl {
    type DownloadStream = Pin<Box<dyn Stream<Item = Result<FileChunk, Status>> + Send>>;

    async fn upload_file(
        &self,
        request: Request<Streaming<FileChunk>>,
    ) -> Result<Response<UploadAck>, Status> {
        respond("UploadFile", self.upload(request).await)
    }

    async fn download(
        &self,
        request: Request<DownloadRequest>,
    ) -> Result<Response<Self::DownloadStream>, Status> {
        let path = request.into_inner().path;
        let opened = self
            .files
            .read_chunks(&path, self.chunk_size)
            .await
            .map_err(ApiError::from);
        let chunks = match opened {
            Ok(chunks) => chunks,
            Err(err) => return respond("Download", Err(err)),
        };
        with_metrics(|m| m.record_rpc("Download", true));
        let stream = chunks.map(|chunk| {
            chunk
                .map(|content| FileChunk { content })
                .map_err(|e| Status::from(ApiError::from(e)))
        });
        Ok(Response::new(Box::pin(stream)))
    }

    async fn list_files(
        &self,
        request: Request<ListFilesRequest>,
    ) -> Result<Response<ListFilesResponse>, Status> {
        respond("ListFiles", self.list(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RolePolicy;
    use crate::config::ImportConfig;
    use crate::queue::{ChannelExportQueue, ExportSubscriber};
    use fleet_test_utils::fixtures::seeded_inventory;
    use tempfile::TempDir;

    fn with_caller<T>(body: T, role: &'static str) -> Request<T> {
        let mut request = Request::new(body);
        request.metadata_mut().insert("role", role.parse().unwrap());
        request.metadata_mut().insert("id", "7".parse().unwrap());
        request
    }

    fn service(dir: &TempDir) -> (ServerServiceImpl, crate::queue::ChannelExportReceiver) {
        let store: Arc<dyn InventoryStore> = Arc::new(seeded_inventory(4));
        let importer = Arc::new(ImportProcessor::new(
            store.clone(),
            &ImportConfig {
                upload_dir: dir.path().to_path_buf(),
            },
        ));
        let (queue, receiver) = ChannelExportQueue::new("fleet.export", 4);
        let svc = ServerServiceImpl::new(
            store,
            importer,
            ExportProducer::new(Arc::new(queue)),
            Arc::new(RolePolicy),
        );
        (svc, receiver)
    }

    #[tokio::test]
    async fn test_list_returns_rows_and_total() {
        let dir = TempDir::new().unwrap();
        let (svc, _rx) = service(&dir);
        let request = proto::ListServersRequest {
            pagination: Some(proto::Pagination {
                limit: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let response = svc
            .list_servers(with_caller(request, "viewer"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.servers.len(), 2);
        assert_eq!(response.total, 4);
    }

    #[tokio::test]
    async fn test_viewer_cannot_create() {
        let dir = TempDir::new().unwrap();
        let (svc, _rx) = service(&dir);
        let request = CreateServerRequest {
            name: "new".into(),
            ipv4: "10.1.1.1".into(),
            ..Default::default()
        };
        let status = svc
            .create_server(with_caller(request, "viewer"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[tokio::test]
    async fn test_missing_role_is_internal() {
        let dir = TempDir::new().unwrap();
        let (svc, _rx) = service(&dir);
        let status = svc
            .count_servers(Request::new(proto::ListServersRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_already_exists() {
        let dir = TempDir::new().unwrap();
        let (svc, _rx) = service(&dir);
        let request = CreateServerRequest {
            name: "srv-000".into(),
            ipv4: "10.1.1.1".into(),
            ..Default::default()
        };
        let status = svc
            .create_server(with_caller(request, "admin"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_unknown_sort_column_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let (svc, _rx) = service(&dir);
        let request = proto::ListServersRequest {
            pagination: Some(proto::Pagination {
                sort_by: Some("password".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = svc
            .list_servers(with_caller(request, "viewer"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_export_queues_job_for_caller() {
        let dir = TempDir::new().unwrap();
        let (svc, mut rx) = service(&dir);
        let request = ExportServerRequest {
            file_name: "on.xlsx".into(),
            filter: Some(proto::ServerFilter {
                status: proto::ServerStatus::On as i32,
                ..Default::default()
            }),
            pagination: None,
        };
        svc.export_server(with_caller(request, "admin")).await.unwrap();

        let job = rx.next_message().await.unwrap().unwrap().decode().unwrap();
        assert_eq!(job.user_id, 7);
        assert_eq!(
            job.filter.and_then(|f| f.status),
            Some(ServerStatus::On)
        );
    }

    #[tokio::test]
    async fn test_update_with_empty_patch_is_invalid() {
        let dir = TempDir::new().unwrap();
        let (svc, _rx) = service(&dir);
        let request = UpdateServerByNameRequest {
            name: "srv-001".into(),
            ..Default::default()
        };
        let status = svc
            .update_server_by_name(with_caller(request, "admin"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
