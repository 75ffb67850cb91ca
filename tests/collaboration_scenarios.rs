use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use staffhub_collab::collab::{
    ChangeType, CollabPolicy, CollaborationCoordinator, FieldChange, ManualClock,
};

fn coordinator() -> (CollaborationCoordinator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    (CollaborationCoordinator::new(CollabPolicy::default(), clock.clone()), clock)
}

fn status_change(user_id: &str, user_name: &str, value: &str) -> FieldChange {
    let (old, new) = (Some(json!("Active")), Some(json!(value)));
    FieldChange::new("status", old, new, user_id, user_name, ChangeType::Update)
}

#[test]
fn salary_lock_is_contended_then_reclaimed() {
    let (c, clock) = coordinator();

    c.join_session("Employee", "42", "user-a", "A", "conn-a");
    assert!(c.lock_field("Employee", "42", "salary", "user-a", "A").success);

    c.join_session("Employee", "42", "user-b", "B", "conn-b");
    let rejected = c.lock_field("Employee", "42", "salary", "user-b", "B");
    assert!(!rejected.success);
    assert!(rejected.message.contains("locked by A"));
    assert_eq!(rejected.lock.map(|l| l.user_name), Some("A".to_string()));

    clock.advance(Duration::minutes(6));
    let retried = c.lock_field("Employee", "42", "salary", "user-b", "B");
    assert!(retried.success);
    assert_eq!(retried.lock.map(|l| l.user_id), Some("user-b".to_string()));
}

#[test]
fn simultaneous_status_edits_are_flagged() {
    let (c, _) = coordinator();
    c.join_session("Employee", "42", "user-a", "A", "conn-a");
    c.join_session("Employee", "42", "user-b", "B", "conn-b");

    let first = c.process_field_change(
        "Employee",
        "42",
        status_change("user-a", "A", "OnLeave"),
    );
    let second = c.process_field_change(
        "Employee",
        "42",
        status_change("user-b", "B", "Terminated"),
    );

    assert!(!first.has_conflict);
    assert!(second.has_conflict);
    let conflict = second.conflict.expect("conflict");
    let values: Vec<_> = conflict
        .conflicting_changes
        .iter()
        .map(|c| c.value.clone())
        .collect();
    assert_eq!(values, vec![Some(json!("Terminated")), Some(json!("OnLeave"))]);

    // Both edits are kept in history, versioned in arrival order.
    let snapshot = c.get_session("Employee", "42").expect("session");
    let versions: Vec<u64> = snapshot.change_history.iter().map(|c| c.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(snapshot.conflicts.len(), 1);
}

#[test]
fn reconnect_survives_late_disconnect_and_sweep() {
    let (c, clock) = coordinator();
    c.join_session("Department", "hr", "user-a", "A", "conn-1");
    c.join_session("Department", "hr", "user-a", "A", "conn-2");

    assert!(c.handle_user_disconnect("user-a", "conn-1").is_empty());
    assert_eq!(c.get_online_users("Department", "hr").len(), 1);

    clock.advance(Duration::minutes(10));
    let report = c.cleanup_expired_sessions();
    assert_eq!(report.sessions_removed, 0);
    assert_eq!(report.participants_evicted, 0);

    let departures = c.handle_user_disconnect("user-a", "conn-2");
    assert_eq!(departures.len(), 1);
    assert!(departures[0].1.session_closed);
    assert!(c.get_session("Department", "hr").is_none());
}
