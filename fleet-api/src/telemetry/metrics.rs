//! Prometheus Metrics Definitions
//!
//! Defines all fleet metrics with their labels.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// Store operation latency buckets (seconds)
const STORE_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<FleetMetrics>> = Lazy::new(FleetMetrics::new);

/// Outcome of a cached list read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// Query shape is never cached.
    Bypass,
    /// Cache failed and the read fell through to the store.
    Error,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Bypass => "bypass",
            CacheOutcome::Error => "error",
        }
    }
}

/// Container for all fleet metrics.
#[derive(Clone)]
pub struct FleetMetrics {
    /// RPC counter - labels: method, status
    pub rpc_requests_total: CounterVec,

    /// Cached list reads - labels: outcome
    pub cache_lookups_total: CounterVec,

    /// Cache entries dropped or rewritten by writes - labels: action
    pub cache_invalidations_total: CounterVec,

    /// Store operation counter - labels: operation, status
    pub store_operations_total: CounterVec,

    /// Store operation duration histogram - labels: operation
    pub store_operation_duration_seconds: HistogramVec,

    /// Export jobs by terminal status - labels: status
    pub export_jobs_total: CounterVec,

    /// Imported rows - labels: outcome (imported/rejected)
    pub import_rows_total: CounterVec,
}

impl FleetMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            rpc_requests_total: register_counter_vec!(
                "fleet_rpc_requests_total",
                "Total number of gRPC requests",
                &["method", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rpc_requests_total: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "fleet_cache_lookups_total",
                "Cached list reads by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            cache_invalidations_total: register_counter_vec!(
                "fleet_cache_invalidations_total",
                "Cache entries invalidated by writes",
                &["action"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_invalidations_total: {}", e)))?,

            store_operations_total: register_counter_vec!(
                "fleet_store_operations_total",
                "Total number of inventory store operations",
                &["operation", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register store_operations_total: {}", e)))?,

            store_operation_duration_seconds: register_histogram_vec!(
                "fleet_store_operation_duration_seconds",
                "Inventory store operation duration in seconds",
                &["operation"],
                STORE_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register store_operation_duration_seconds: {}", e)))?,

            export_jobs_total: register_counter_vec!(
                "fleet_export_jobs_total",
                "Export jobs by terminal status",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register export_jobs_total: {}", e)))?,

            import_rows_total: register_counter_vec!(
                "fleet_import_rows_total",
                "Rows processed by bulk import",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register import_rows_total: {}", e)))?,
        })
    }

    /// Record a completed RPC.
    pub fn record_rpc(&self, method: &str, success: bool) {
        let status = if success { "ok" } else { "error" };
        self.rpc_requests_total
            .with_label_values(&[method, status])
            .inc();
    }

    pub fn record_cache_lookup(&self, outcome: CacheOutcome) {
        self.cache_lookups_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_cache_invalidation(&self, action: &str, entries: usize) {
        self.cache_invalidations_total
            .with_label_values(&[action])
            .inc_by(entries as f64);
    }

    /// Record a store operation.
    pub fn record_store_operation(&self, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.store_operations_total
            .with_label_values(&[operation, status])
            .inc();
        self.store_operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_export_job(&self, status: &str) {
        self.export_jobs_total.with_label_values(&[status]).inc();
    }

    pub fn record_import(&self, imported: usize, rejected: usize) {
        self.import_rows_total
            .with_label_values(&["imported"])
            .inc_by(imported as f64);
        self.import_rows_total
            .with_label_values(&["rejected"])
            .inc_by(rejected as f64);
    }
}

/// Run `f` against the global metrics, if they registered.
pub fn with_metrics(f: impl FnOnce(&FleetMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

/// Admin router serving `/metrics`.
pub fn admin_router() -> axum::Router {
    axum::Router::new().route("/metrics", axum::routing::get(metrics_handler))
}
