use crate::{
    handlers::{
        cleanup_sessions, diagnostics, get_field_locks, get_online_users, get_session,
        health_check, ready_check, resolve_conflict,
    },
    ws::hub::CollabHub,
};
use axum::{routing::{get, post, put}, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(hub: Arc<CollabHub>) -> Router {
    Router::<Arc<CollabHub>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/sessions/cleanup", post(cleanup_sessions))
        .route("/v1/sessions/:entity_type/:entity_id", get(get_session))
        .route("/v1/sessions/:entity_type/:entity_id/users", get(get_online_users))
        .route("/v1/sessions/:entity_type/:entity_id/locks", get(get_field_locks))
        .route(
            "/v1/sessions/:entity_type/:entity_id/conflicts/:conflict_id",
            put(resolve_conflict),
        )
        .with_state(hub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{
        ChangeType, CollabPolicy, CollaborationCoordinator, FieldChange, SessionSnapshot,
    };
    use axum::{body::{to_bytes, Body}, http::{Request, StatusCode}};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn hub() -> Arc<CollabHub> {
        Arc::new(CollabHub::new(Arc::new(CollaborationCoordinator::with_policy(
            CollabPolicy::default(),
        ))))
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call(create_api_routes(hub()), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
    }

    #[tokio::test]
    async fn ready_reports_session_count() {
        let hub = hub();
        hub.coordinator().join_session("Employee", "42", "a", "A", "conn-a");
        let (status, body) = call(create_api_routes(hub), get_req("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Coordinating 1 session(s) with 1 participant(s)"));
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let request = get_req("/v1/sessions/Employee/42");
        let (status, body) = call(create_api_routes(hub()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!(404));
    }

    #[tokio::test]
    async fn session_users_and_locks_are_exposed() {
        let hub = hub();
        let coordinator = hub.coordinator().clone();
        coordinator.join_session("Employee", "42", "a", "A", "conn-a");
        coordinator.lock_field("Employee", "42", "salary", "a", "A");

        let request = get_req("/v1/sessions/Employee/42");
        let (status, body) = call(create_api_routes(hub.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: SessionSnapshot = serde_json::from_value(body).expect("snapshot");
        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.field_locks.len(), 1);

        let request = get_req("/v1/sessions/Employee/42/users");
        let (_, users) = call(create_api_routes(hub.clone()), request).await;
        assert_eq!(users[0]["userId"], json!("a"));

        let request = get_req("/v1/sessions/Employee/42/locks");
        let (_, locks) = call(create_api_routes(hub), request).await;
        assert_eq!(locks[0]["fieldName"], json!("salary"));
    }

    #[tokio::test]
    async fn conflicts_can_be_resolved_over_http() {
        let hub = hub();
        let coordinator = hub.coordinator().clone();
        coordinator.join_session("Employee", "42", "a", "A", "conn-a");
        coordinator.join_session("Employee", "42", "b", "B", "conn-b");
        for (user, value) in [("a", "Active"), ("b", "Suspended")] {
            coordinator.process_field_change(
                "Employee",
                "42",
                FieldChange::new(
                    "status",
                    None,
                    Some(json!(value)),
                    user,
                    user,
                    ChangeType::Update,
                ),
            );
        }
        let conflict_id = coordinator
            .get_session("Employee", "42")
            .and_then(|s| s.conflicts.first().map(|c| c.conflict_id))
            .expect("conflict");

        let resolution = json!({
            "status": "Resolved",
            "resolvedBy": "a",
            "resolvedValue": "Active",
        });
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/v1/sessions/Employee/42/conflicts/{}", conflict_id))
            .header("content-type", "application/json")
            .body(Body::from(resolution.to_string()))
            .expect("request");
        let (status, body) = call(create_api_routes(hub.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("Resolved"));
        assert_eq!(body["resolvedValue"], json!("Active"));

        let missing = Request::builder()
            .method("PUT")
            .uri(format!("/v1/sessions/Employee/42/conflicts/{}", uuid::Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(json!({"status": "Ignored", "resolvedBy": "a"}).to_string()))
            .expect("request");
        let (status, _) = call(create_api_routes(hub), missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cleanup_returns_report() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/sessions/cleanup")
            .body(Body::empty())
            .expect("request");
        let (status, body) = call(create_api_routes(hub()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionsRemoved"], json!(0));
    }
}
