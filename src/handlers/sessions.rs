use crate::{
    collab::{CollaborationUser, ConflictInfo, FieldLock, SessionSnapshot, SweepReport},
    models::{ErrorResponse, ResolveConflictRequest},
    ws::hub::CollabHub,
};
use axum::{extract::{Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Snapshot of the live session for one entity
pub async fn get_session(
    State(hub): State<Arc<CollabHub>>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    match hub.coordinator().get_session(&entity_type, &entity_id) {
        Some(snapshot) => Ok((StatusCode::OK, Json(snapshot))),
        None => Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("No active session for {}/{}", entity_type, entity_id),
        )),
    }
}

/// Users currently editing an entity
pub async fn get_online_users(
    State(hub): State<Arc<CollabHub>>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> (StatusCode, Json<Vec<CollaborationUser>>) {
    let users = hub.coordinator().get_online_users(&entity_type, &entity_id);
    (StatusCode::OK, Json(users))
}

/// Field locks currently in force on an entity
pub async fn get_field_locks(
    State(hub): State<Arc<CollabHub>>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> (StatusCode, Json<Vec<FieldLock>>) {
    let locks = hub.coordinator().get_field_locks(&entity_type, &entity_id);
    (StatusCode::OK, Json(locks))
}

/// Record how a detected conflict was settled
pub async fn resolve_conflict(
    State(hub): State<Arc<CollabHub>>,
    Path((entity_type, entity_id, conflict_id)): Path<(String, String, Uuid)>,
    Json(payload): Json<ResolveConflictRequest>,
) -> Result<(StatusCode, Json<ConflictInfo>), ApiError> {
    if payload.resolved_by.is_empty() {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "resolvedBy is required"));
    }

    match hub.coordinator().resolve_conflict(
        &entity_type,
        &entity_id,
        conflict_id,
        payload.status,
        &payload.resolved_by,
        payload.resolved_value,
    ) {
        Some(conflict) => Ok((StatusCode::OK, Json(conflict))),
        None => {
            warn!("Conflict {} not found on {}/{}", conflict_id, entity_type, entity_id);
            Err(ErrorResponse::reply(
                StatusCode::NOT_FOUND,
                format!("Conflict '{}' not found on {}/{}", conflict_id, entity_type, entity_id),
            ))
        }
    }
}

/// Run an expiry sweep now
pub async fn cleanup_sessions(
    State(hub): State<Arc<CollabHub>>,
) -> (StatusCode, Json<SweepReport>) {
    let report = hub.coordinator().cleanup_expired_sessions();
    info!("Manual sweep requested: {:?}", report);
    (StatusCode::OK, Json(report))
}
