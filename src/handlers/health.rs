use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::debug;

use crate::{models::HealthResponse, ws::hub::CollabHub};

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness probe. The coordinator is in-memory only, so it is ready as soon
/// as it answers; the message carries the live session count.
pub async fn ready_check(State(hub): State<Arc<CollabHub>>) -> Json<HealthResponse> {
    let stats = hub.coordinator().stats();
    debug!("Readiness check requested ({} sessions)", stats.sessions);
    Json(HealthResponse {
        status: "ok".to_string(),
        message: format!(
            "Coordinating {} session(s) with {} participant(s)",
            stats.sessions, stats.participants
        ),
    })
}
