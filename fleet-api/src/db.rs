//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the SQL
//! implementations of [`InventoryStore`] and [`FileArtifactStore`].
//!
//! Every statement is parameterised. Filters are turned into a WHERE clause
//! plus a [`SqlParam`] list; ORDER BY only ever interpolates whitelisted
//! column names from [`SortColumn::as_sql`].

use crate::error::{ApiError, ApiResult};
use crate::telemetry::with_metrics;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use fleet_core::{
    EntityKind, FileArtifact, FileId, FileStatus, FleetError, FleetResult, ImportReport,
    NewServer, ServerId, ServerPatch, ServerQuery, ServerRecord, ServerStatus, SortColumn,
    StorageError, Timestamp, UserId,
};
use fleet_storage::{FileArtifactStore, InventoryStore};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

const SERVER_COLUMNS: &str =
    "id, name, ipv4, status, created_at, updated_at, deleted_at, created_by, updated_by, deleted_by";

const FILE_COLUMNS: &str = "id, file_name, path, status, owner, created_at, updated_at";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
    /// Apply `sql/schema.sql` at startup
    pub auto_migrate: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "fleet".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            auto_migrate: false,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("FLEET_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("FLEET_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("FLEET_DB_NAME").unwrap_or_else(|_| "fleet".to_string()),
            user: std::env::var("FLEET_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("FLEET_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("FLEET_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("FLEET_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            auto_migrate: std::env::var("FLEET_DB_AUTO_MIGRATE")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SQL PARAMETERS
// ============================================================================

/// Type-erased SQL parameter, so WHERE clauses can be assembled at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    OptUuid(Option<Uuid>),
    String(String),
    OptString(Option<String>),
    Long(i64),
    OptLong(Option<i64>),
    Bool(bool),
    Timestamp(Timestamp),
}

impl SqlParam {
    /// Borrow as a value tokio_postgres can bind.
    pub fn as_to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Uuid(v) => v,
            SqlParam::OptUuid(v) => v,
            SqlParam::String(v) => v,
            SqlParam::OptString(v) => v,
            SqlParam::Long(v) => v,
            SqlParam::OptLong(v) => v,
            SqlParam::Bool(v) => v,
            SqlParam::Timestamp(v) => v,
        }
    }
}

fn bind(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(SqlParam::as_to_sql).collect()
}

/// Escape LIKE metacharacters so search text matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// WHERE clause for the query's search text and filter. Soft-deleted rows
/// are always excluded.
pub fn build_where(query: &ServerQuery) -> (String, Vec<SqlParam>) {
    let mut conditions = vec!["deleted_at IS NULL".to_string()];
    let mut params = Vec::new();

    if let Some(search) = &query.search {
        params.push(SqlParam::String(like_pattern(search)));
        let idx = params.len();
        conditions.push(format!("(name LIKE ${idx} OR ipv4 LIKE ${idx})"));
    }

    let f = &query.filter;
    let bounds = [
        ("created_at >", f.created_after),
        ("created_at <", f.created_before),
        ("updated_at >", f.updated_after),
        ("updated_at <", f.updated_before),
    ];
    for (predicate, bound) in bounds {
        if let Some(ts) = bound {
            params.push(SqlParam::Timestamp(ts));
            conditions.push(format!("{} ${}", predicate, params.len()));
        }
    }

    if let Some(status) = f.status.and_then(|s| s.as_db_str()) {
        params.push(SqlParam::String(status.to_string()));
        conditions.push(format!("status = ${}", params.len()));
    }

    (conditions.join(" AND "), params)
}

/// ORDER BY clause. Ties are broken by id in the same direction.
pub fn order_clause(query: &ServerQuery) -> String {
    match query.order {
        Some(order) => {
            let dir = if order.direction.is_descending() {
                "DESC"
            } else {
                "ASC"
            };
            if order.column == SortColumn::Id {
                format!("id {}", dir)
            } else {
                format!("{} {}, id {}", order.column.as_sql(), dir, dir)
            }
        }
        None => "created_at ASC, id ASC".to_string(),
    }
}

/// Full SELECT for a list query.
pub fn select_sql(query: &ServerQuery) -> (String, Vec<SqlParam>) {
    let (where_sql, mut params) = build_where(query);
    let mut sql = format!(
        "SELECT {} FROM servers WHERE {} ORDER BY {}",
        SERVER_COLUMNS,
        where_sql,
        order_clause(query)
    );
    if let Some(limit) = query.limit {
        params.push(SqlParam::Long(limit));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }
    if let Some(offset) = query.offset {
        params.push(SqlParam::Long(offset));
        sql.push_str(&format!(" OFFSET ${}", params.len()));
    }
    (sql, params)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn server_from_row(row: &Row) -> FleetResult<ServerRecord> {
    let status: Option<String> = row.try_get("status").map_err(backend)?;
    Ok(ServerRecord {
        id: row.try_get("id").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        ipv4: row.try_get("ipv4").map_err(backend)?,
        status: ServerStatus::from_db_str(status.as_deref()),
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
        deleted_at: row.try_get("deleted_at").map_err(backend)?,
        created_by: row.try_get("created_by").map_err(backend)?,
        updated_by: row.try_get("updated_by").map_err(backend)?,
        deleted_by: row.try_get("deleted_by").map_err(backend)?,
    })
}

fn artifact_from_row(row: &Row) -> FleetResult<FileArtifact> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(FileArtifact {
        id: row.try_get("id").map_err(backend)?,
        file_name: row.try_get("file_name").map_err(backend)?,
        path: row.try_get("path").map_err(backend)?,
        status: FileStatus::from_db_str(&status)
            .map_err(|reason| FleetError::from(StorageError::Backend { reason }))?,
        owner: row.try_get("owner").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn backend(err: impl std::fmt::Display) -> FleetError {
    StorageError::Backend {
        reason: err.to_string(),
    }
    .into()
}

/// Unique violations become already-exists on `key`.
fn write_error(err: tokio_postgres::Error, key: &str) -> FleetError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return FleetError::server_exists(key);
    }
    tracing::error!("Database error: {:?}", err);
    backend(err)
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

/// Row selector for single-record writes.
enum ServerKey<'a> {
    Id(ServerId),
    Name(&'a str),
}

impl ServerKey<'_> {
    fn condition(&self) -> &'static str {
        match self {
            ServerKey::Id(_) => "id = $1",
            ServerKey::Name(_) => "name = $1",
        }
    }

    fn param(&self) -> SqlParam {
        match self {
            ServerKey::Id(id) => SqlParam::Uuid(*id),
            ServerKey::Name(name) => SqlParam::String(name.to_string()),
        }
    }

    fn describe(&self) -> String {
        match self {
            ServerKey::Id(id) => id.to_string(),
            ServerKey::Name(name) => name.to_string(),
        }
    }
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> FleetResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!("Connection pool error: {:?}", e);
            backend(e)
        })
    }

    /// Create the tables and indexes if they are missing.
    pub async fn apply_schema(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        tracing::info!("Schema applied");
        Ok(())
    }

    async fn timed<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = FleetResult<T>>,
    ) -> FleetResult<T> {
        let start = Instant::now();
        let result = fut.await;
        let elapsed = start.elapsed().as_secs_f64();
        with_metrics(|m| m.record_store_operation(operation, result.is_ok(), elapsed));
        result
    }

    async fn update_where(&self, key: ServerKey<'_>, patch: ServerPatch) -> FleetResult<ServerRecord> {
        patch.validate()?;
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE servers SET \
                name = COALESCE($2, name), \
                ipv4 = COALESCE($3, ipv4), \
                status = CASE WHEN $4 THEN $5 ELSE status END, \
                updated_at = $6, \
                updated_by = COALESCE($7, updated_by) \
             WHERE {} AND deleted_at IS NULL \
             RETURNING {}",
            key.condition(),
            SERVER_COLUMNS
        );
        let params = [
            key.param(),
            SqlParam::OptString(patch.name.clone()),
            SqlParam::OptString(patch.ipv4.clone()),
            SqlParam::Bool(patch.status.is_some()),
            SqlParam::OptString(patch.status.and_then(|s| s.as_db_str()).map(str::to_string)),
            SqlParam::Timestamp(Utc::now()),
            SqlParam::OptLong(patch.updated_by),
        ];
        let conflict_key = patch.name.clone().unwrap_or_else(|| key.describe());
        let row = conn
            .query_opt(&sql, &bind(&params))
            .await
            .map_err(|e| write_error(e, &conflict_key))?
            .ok_or_else(|| FleetError::server_not_found(key.describe()))?;
        server_from_row(&row)
    }

    async fn delete_where(&self, key: ServerKey<'_>, actor: Option<UserId>) -> FleetResult<ServerRecord> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE servers SET deleted_at = $2, deleted_by = $3 \
             WHERE {} AND deleted_at IS NULL \
             RETURNING {}",
            key.condition(),
            SERVER_COLUMNS
        );
        let params = [
            key.param(),
            SqlParam::Timestamp(Utc::now()),
            SqlParam::OptLong(actor),
        ];
        let row = conn
            .query_opt(&sql, &bind(&params))
            .await
            .map_err(backend)?
            .ok_or_else(|| FleetError::server_not_found(key.describe()))?;
        server_from_row(&row)
    }

    async fn select_rows(&self, query: &ServerQuery) -> FleetResult<Vec<ServerRecord>> {
        let conn = self.get_conn().await?;
        let (sql, params) = select_sql(query);
        let rows = conn.query(&sql, &bind(&params)).await.map_err(backend)?;
        rows.iter().map(server_from_row).collect()
    }

    async fn count_rows(&self, query: &ServerQuery) -> FleetResult<i64> {
        let conn = self.get_conn().await?;
        let (where_sql, params) = build_where(query);
        let sql = format!("SELECT COUNT(*) FROM servers WHERE {}", where_sql);
        let row = conn.query_one(&sql, &bind(&params)).await.map_err(backend)?;
        row.try_get::<_, i64>(0).map_err(backend)
    }

    async fn insert_one(&self, server: NewServer) -> FleetResult<ServerRecord> {
        server.validate()?;
        let conn = self.get_conn().await?;
        let record = server.into_record(Utc::now());
        let sql = format!(
            "INSERT INTO servers (id, name, ipv4, status, created_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            SERVER_COLUMNS
        );
        let params = [
            SqlParam::Uuid(record.id),
            SqlParam::String(record.name.clone()),
            SqlParam::String(record.ipv4.clone()),
            SqlParam::OptString(record.status.as_db_str().map(str::to_string)),
            SqlParam::Timestamp(record.created_at),
            SqlParam::OptLong(record.created_by),
        ];
        let row = conn
            .query_one(&sql, &bind(&params))
            .await
            .map_err(|e| write_error(e, &record.name))?;
        server_from_row(&row)
    }

    /// Partition candidates against stored rows and each other, then insert
    /// the survivors with one statement.
    async fn insert_batch(
        &self,
        actor: UserId,
        candidates: Vec<NewServer>,
    ) -> FleetResult<ImportReport> {
        for candidate in &candidates {
            candidate.validate()?;
        }
        let mut report = ImportReport::default();
        if candidates.is_empty() {
            return Ok(report);
        }
        let conn = self.get_conn().await?;

        let ids: Vec<Uuid> = candidates.iter().filter_map(|c| c.id).collect();
        let names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
        let rows = conn
            .query(
                "SELECT id, name, deleted_at IS NULL AS live FROM servers \
                 WHERE id = ANY($1) OR (name = ANY($2) AND deleted_at IS NULL)",
                &[&ids, &names],
            )
            .await
            .map_err(backend)?;
        let mut taken_ids = HashSet::new();
        let mut taken_names = HashSet::new();
        for row in &rows {
            taken_ids.insert(row.try_get::<_, Uuid>("id").map_err(backend)?);
            if row.try_get::<_, bool>("live").map_err(backend)? {
                taken_names.insert(row.try_get::<_, String>("name").map_err(backend)?);
            }
        }

        let now = Utc::now();
        for candidate in candidates {
            let id_taken = candidate.id.is_some_and(|id| taken_ids.contains(&id));
            if id_taken || taken_names.contains(&candidate.name) {
                report.failed.push(candidate);
                continue;
            }
            let record = candidate.by(actor).into_record(now);
            taken_ids.insert(record.id);
            taken_names.insert(record.name.clone());
            report.imported.push(record);
        }

        if !report.imported.is_empty() {
            let ids: Vec<Uuid> = report.imported.iter().map(|r| r.id).collect();
            let names: Vec<&str> = report.imported.iter().map(|r| r.name.as_str()).collect();
            let ipv4s: Vec<&str> = report.imported.iter().map(|r| r.ipv4.as_str()).collect();
            let statuses: Vec<Option<&str>> = report
                .imported
                .iter()
                .map(|r| r.status.as_db_str())
                .collect();
            conn.execute(
                "INSERT INTO servers (id, name, ipv4, status, created_at, created_by) \
                 SELECT u.id, u.name, u.ipv4, u.status, $5, $6 \
                 FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[]) \
                   AS u(id, name, ipv4, status)",
                &[&ids, &names, &ipv4s, &statuses, &now, &actor],
            )
            .await
            .map_err(|e| write_error(e, "batch"))?;
        }

        tracing::debug!(
            imported = report.imported.len(),
            failed = report.failed.len(),
            "Batch insert complete"
        );
        Ok(report)
    }

    async fn find_one(&self, key: ServerKey<'_>) -> FleetResult<Option<ServerRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM servers WHERE {} AND deleted_at IS NULL",
            SERVER_COLUMNS,
            key.condition()
        );
        let params = [key.param()];
        let row = conn.query_opt(&sql, &bind(&params)).await.map_err(backend)?;
        row.as_ref().map(server_from_row).transpose()
    }
}

// ============================================================================
// INVENTORY STORE
// ============================================================================

#[async_trait]
impl InventoryStore for DbClient {
    async fn find(&self, query: &ServerQuery) -> FleetResult<Vec<ServerRecord>> {
        self.timed("find", self.select_rows(query)).await
    }

    async fn count(&self, query: &ServerQuery) -> FleetResult<i64> {
        self.timed("count", self.count_rows(query)).await
    }

    async fn find_by_id(&self, id: ServerId) -> FleetResult<Option<ServerRecord>> {
        self.timed("find_by_id", self.find_one(ServerKey::Id(id))).await
    }

    async fn find_by_name(&self, name: &str) -> FleetResult<Option<ServerRecord>> {
        self.timed("find_by_name", self.find_one(ServerKey::Name(name)))
            .await
    }

    async fn exists(&self, candidate: &NewServer) -> FleetResult<bool> {
        let conn = self.get_conn().await?;
        let params = [
            SqlParam::OptUuid(candidate.id),
            SqlParam::String(candidate.name.clone()),
        ];
        let row = conn
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM servers \
                 WHERE id = $1 OR (name = $2 AND deleted_at IS NULL))",
                &bind(&params),
            )
            .await
            .map_err(backend)?;
        row.try_get::<_, bool>(0).map_err(backend)
    }

    async fn create(&self, server: NewServer) -> FleetResult<ServerRecord> {
        self.timed("create", self.insert_one(server)).await
    }

    async fn update_by_id(&self, id: ServerId, patch: ServerPatch) -> FleetResult<ServerRecord> {
        self.timed("update", self.update_where(ServerKey::Id(id), patch))
            .await
    }

    async fn update_by_name(&self, name: &str, patch: ServerPatch) -> FleetResult<ServerRecord> {
        self.timed("update", self.update_where(ServerKey::Name(name), patch))
            .await
    }

    async fn delete_by_id(&self, id: ServerId, actor: Option<UserId>) -> FleetResult<ServerRecord> {
        self.timed("delete", self.delete_where(ServerKey::Id(id), actor))
            .await
    }

    async fn delete_by_name(
        &self,
        name: &str,
        actor: Option<UserId>,
    ) -> FleetResult<ServerRecord> {
        self.timed("delete", self.delete_where(ServerKey::Name(name), actor))
            .await
    }

    async fn create_batch(
        &self,
        actor: UserId,
        candidates: Vec<NewServer>,
    ) -> FleetResult<ImportReport> {
        self.timed("create_batch", self.insert_batch(actor, candidates))
            .await
    }
}

// ============================================================================
// FILE ARTIFACT STORE
// ============================================================================

fn artifact_not_found(id: FileId) -> FleetError {
    StorageError::NotFound {
        entity: EntityKind::FileArtifact,
        key: id.to_string(),
    }
    .into()
}

#[async_trait]
impl FileArtifactStore for DbClient {
    async fn create_artifact(&self, artifact: &FileArtifact) -> FleetResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO files (id, file_name, path, status, owner, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &artifact.id,
                &artifact.file_name,
                &artifact.path,
                &artifact.status.as_db_str(),
                &artifact.owner,
                &artifact.created_at,
                &artifact.updated_at,
            ],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                FleetError::from(StorageError::AlreadyExists {
                    entity: EntityKind::FileArtifact,
                    key: artifact.id.to_string(),
                })
            } else {
                backend(e)
            }
        })?;
        Ok(())
    }

    async fn set_artifact_status(&self, id: FileId, status: FileStatus) -> FleetResult<FileArtifact> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE files SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            FILE_COLUMNS
        );
        let now: Timestamp = Utc::now();
        let row = conn
            .query_opt(&sql, &[&id, &status.as_db_str(), &now])
            .await
            .map_err(backend)?
            .ok_or_else(|| artifact_not_found(id))?;
        artifact_from_row(&row)
    }

    async fn get_artifact(&self, id: FileId) -> FleetResult<Option<FileArtifact>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM files WHERE id = $1", FILE_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await.map_err(backend)?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn list_artifacts(&self, owner: UserId) -> FleetResult<Vec<FileArtifact>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM files WHERE owner = $1 ORDER BY created_at DESC, id DESC",
            FILE_COLUMNS
        );
        let rows = conn.query(&sql, &[&owner]).await.map_err(backend)?;
        rows.iter().map(artifact_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{ListServersRequest, Pagination, ServerFilter, SortDirection};

    fn resolve(req: ListServersRequest) -> ServerQuery {
        req.resolve().unwrap()
    }

    #[test]
    fn test_where_always_hides_deleted() {
        let (sql, params) = build_where(&ServerQuery::all());
        assert_eq!(sql, "deleted_at IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_where_numbers_params_in_order() {
        let query = resolve(ListServersRequest {
            query: Some("10.0".to_string()),
            filter: Some(ServerFilter {
                created_at_from: Some("2024-01-01T00:00:00Z".to_string()),
                status: Some(ServerStatus::On),
                ..Default::default()
            }),
            pagination: None,
        });
        let (sql, params) = build_where(&query);
        assert_eq!(
            sql,
            "deleted_at IS NULL AND (name LIKE $1 OR ipv4 LIKE $1) AND created_at > $2 AND status = $3"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], SqlParam::String("%10.0%".to_string()));
        assert_eq!(params[2], SqlParam::String("on".to_string()));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a%b_c"), "%a\\%b\\_c%");
    }

    #[test]
    fn test_order_clause() {
        assert_eq!(order_clause(&ServerQuery::all()), "created_at ASC, id ASC");
        let query = ServerQuery::all().ordered_by(SortColumn::Name, SortDirection::Desc);
        assert_eq!(order_clause(&query), "name DESC, id DESC");
        let query = ServerQuery::all().ordered_by(SortColumn::Id, SortDirection::None);
        assert_eq!(order_clause(&query), "id ASC");
    }

    #[test]
    fn test_select_appends_window_params() {
        let query = resolve(ListServersRequest {
            pagination: Some(Pagination {
                limit: Some(10),
                page: Some(3),
                page_size: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        });
        let (sql, params) = select_sql(&query);
        assert!(sql.ends_with("ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2"));
        assert_eq!(params, vec![SqlParam::Long(10), SqlParam::Long(20)]);
    }

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "fleet");
        assert!(!config.auto_migrate);
    }

    #[test]
    fn test_schema_declares_partial_name_index() {
        assert!(SCHEMA_SQL.contains("servers_live_name_idx"));
        assert!(SCHEMA_SQL.contains("WHERE deleted_at IS NULL"));
    }
}
