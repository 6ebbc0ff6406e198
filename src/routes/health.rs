//! Health, readiness, version and status endpoints
//!
//! - /health, /healthz - liveness probe, 200 while the process runs
//! - /ready, /readyz - readiness probe; production instances need MongoDB
//! - /version - build information for deployment verification
//! - /status - runtime counters for the dashboard and operators

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

/// Health probe response
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub mode: String,
    pub node_id: String,
    pub mongo_connected: bool,
    pub nats_connected: bool,
    pub timestamp: String,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        node_id: state.args.node_id.to_string(),
        mongo_connected: state.mongo.is_some(),
        nats_connected: state.nats.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

/// Readiness probe (/ready, /readyz)
///
/// Production instances are ready once MongoDB is connected; dev mode is
/// always ready (memory-only operation is intended there).
pub fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let is_ready = state.args.dev_mode || state.mongo.is_some();

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(status, &build_health_response(&state))
}

/// Build information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "nivaran",
    };

    json_response(StatusCode::OK, &response)
}

/// Config cache counters
#[derive(Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Deadline monitor counters
#[derive(Serialize)]
pub struct MonitorStats {
    pub running: bool,
    pub scans: u64,
    pub alerts: u64,
}

/// Runtime status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub uptime_secs: u64,
    pub dev_mode: bool,
    pub tenants: usize,
    pub routing_bindings: usize,
    pub partitions: usize,
    pub cache: CacheStats,
    pub monitor: MonitorStats,
    pub mongo_connected: bool,
    pub nats_connected: bool,
}

/// Status endpoint (/status)
pub async fn status_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let (hits, misses) = state.cache.stats();
    let total = hits + misses;
    let hit_rate = if total > 0 {
        (hits as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    let (scans, alerts) = state.monitor.stats();

    let response = StatusResponse {
        node_id: state.args.node_id.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        dev_mode: state.args.dev_mode,
        tenants: state.registry.tenant_count(),
        routing_bindings: state.registry.routing_count(),
        partitions: state.partitions.partition_count(),
        cache: CacheStats {
            entries: state.cache.len(),
            hits,
            misses,
            hit_rate,
        },
        monitor: MonitorStats {
            running: state.monitor.is_running().await,
            scans,
            alerts,
        },
        mongo_connected: state.mongo.is_some(),
        nats_connected: state.nats.is_some(),
    };

    json_response(StatusCode::OK, &response)
}
