//! Fleet Telemetry - Observability Infrastructure
//!
//! Structured logging via tracing-subscriber and Prometheus metrics.

pub mod metrics;
pub mod tracer;

pub use metrics::{admin_router, metrics_handler, with_metrics, CacheOutcome, FleetMetrics, METRICS};
pub use tracer::{init_tracing, TelemetryConfig, DEFAULT_LOG_FILTER};
