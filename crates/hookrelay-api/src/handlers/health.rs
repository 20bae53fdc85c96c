//! Health endpoint reporting queue depth and delivery statistics.

use axum::{extract::State, Json};
use hookrelay_delivery::EngineStats;
use serde::Serialize;
use tracing::debug;

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Messages waiting for a lane
    pub queue_depth: usize,
    /// Delivery counters since startup
    pub stats: EngineStats,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Lanes are running
    Healthy,
    /// Ingress is up but no lane is consuming the queue
    Degraded,
}

/// Reports relay health.
///
/// Always answers 200; `status` is `degraded` while no lane is running.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Performing health check");

    let mut stats = state.stats.read().await.clone();
    stats.queue_depth = state.queue.depth();
    stats.rejected_messages = state.queue.rejected();

    let status =
        if stats.active_workers > 0 { HealthStatus::Healthy } else { HealthStatus::Degraded };

    Json(HealthResponse {
        status,
        queue_depth: stats.queue_depth,
        stats,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
