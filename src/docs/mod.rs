use utoipa::OpenApi;
use crate::collab::{
    ChangeType, CollaborationUser, ConflictInfo, ConflictStatus, ConflictingChange, FieldChange,
    FieldLock, SessionSnapshot, SweepReport, UserStatus,
};
use crate::models::{DiagnosticsResponse, ErrorResponse, HealthResponse, ResolveConflictRequest};

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Coordinator and process diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current counters", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Snapshot of a live collaboration session
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{entity_type}/{entity_id}",
    params(
        ("entity_type" = String, Path, description = "Kind of record, e.g. Employee"),
        ("entity_id" = String, Path, description = "Record identifier")
    ),
    responses(
        (status = 200, description = "Session found", body = SessionSnapshot),
        (status = 404, description = "No active session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_session_doc() {}

/// Users currently editing a record
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{entity_type}/{entity_id}/users",
    params(
        ("entity_type" = String, Path, description = "Kind of record"),
        ("entity_id" = String, Path, description = "Record identifier")
    ),
    responses(
        (
            status = 200,
            description = "Online users, empty if no session",
            body = Vec<CollaborationUser>
        )
    )
)]
#[allow(dead_code)]
pub async fn get_online_users_doc() {}

/// Field locks in force on a record
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{entity_type}/{entity_id}/locks",
    params(
        ("entity_type" = String, Path, description = "Kind of record"),
        ("entity_id" = String, Path, description = "Record identifier")
    ),
    responses(
        (status = 200, description = "Unexpired locks", body = Vec<FieldLock>)
    )
)]
#[allow(dead_code)]
pub async fn get_field_locks_doc() {}

/// Record the resolution of a detected conflict
#[utoipa::path(
    put,
    path = "/api/v1/sessions/{entity_type}/{entity_id}/conflicts/{conflict_id}",
    params(
        ("entity_type" = String, Path, description = "Kind of record"),
        ("entity_id" = String, Path, description = "Record identifier"),
        ("conflict_id" = uuid::Uuid, Path, description = "Conflict identifier")
    ),
    request_body = ResolveConflictRequest,
    responses(
        (status = 200, description = "Conflict updated", body = ConflictInfo),
        (status = 400, description = "Missing resolver", body = ErrorResponse),
        (status = 404, description = "Unknown session or conflict", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn resolve_conflict_doc() {}

/// Run an expiry sweep immediately
#[utoipa::path(
    post,
    path = "/api/v1/sessions/cleanup",
    responses(
        (status = 200, description = "What the sweep evicted", body = SweepReport)
    )
)]
#[allow(dead_code)]
pub async fn cleanup_sessions_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        diagnostics_doc,
        get_session_doc,
        get_online_users_doc,
        get_field_locks_doc,
        resolve_conflict_doc,
        cleanup_sessions_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            DiagnosticsResponse,
            ResolveConflictRequest,
            SessionSnapshot,
            CollaborationUser,
            UserStatus,
            FieldLock,
            FieldChange,
            ChangeType,
            ConflictInfo,
            ConflictingChange,
            ConflictStatus,
            SweepReport,
        )
    ),
    tags(
        (name = "api", description = "Collaboration session inspection")
    )
)]
pub struct ApiDoc;
