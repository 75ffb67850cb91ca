use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::policy::CollabPolicy;
use super::session::CollaborationSession;
use super::types::{
    ChangeProcessResult, ConflictInfo, ConflictStatus, ConflictingChange, FieldChange, SessionKey,
};

/// Looks for recent changes to the same field by other users.
///
/// At most `conflict_scan_depth` matches inside `conflict_window` are taken,
/// newest first. Changes older than the window are never flagged even if they
/// were never seen by the incoming editor.
pub fn detect_conflict(
    policy: &CollabPolicy,
    key: &SessionKey,
    history: &[FieldChange],
    incoming: &FieldChange,
    now: DateTime<Utc>,
) -> Option<ConflictInfo> {
    let recent: Vec<&FieldChange> = history
        .iter()
        .rev()
        .filter(|c| c.field_name == incoming.field_name)
        .filter(|c| c.user_id != incoming.user_id)
        .filter(|c| policy.is_within_conflict_window(c.timestamp, now))
        .take(policy.conflict_scan_depth)
        .collect();

    if recent.is_empty() {
        return None;
    }

    let mut conflicting_changes = Vec::with_capacity(recent.len() + 1);
    conflicting_changes.push(ConflictingChange::from(incoming));
    conflicting_changes.extend(recent.into_iter().map(ConflictingChange::from));

    Some(ConflictInfo {
        conflict_id: Uuid::new_v4(),
        entity_type: key.entity_type.clone(),
        entity_id: key.entity_id.clone(),
        field_name: incoming.field_name.clone(),
        conflicting_changes,
        detected_at: now,
        status: ConflictStatus::Pending,
        resolved_by: None,
        resolved_at: None,
        resolved_value: None,
    })
}

impl CollaborationSession {
    /// Versions and appends the change, then reports whether it conflicts.
    /// Conflicting changes are recorded like any other.
    pub(crate) fn record_change(
        &mut self,
        policy: &CollabPolicy,
        mut change: FieldChange,
        now: DateTime<Utc>,
    ) -> ChangeProcessResult {
        self.current_version += 1;
        change.version = self.current_version;
        change.timestamp = now;

        let conflict = detect_conflict(policy, &self.key, &self.change_history, &change, now);
        self.change_history.push(change.clone());
        self.touch_user(&change.user_id, now);

        if let Some(conflict) = &conflict {
            self.conflicts.push(conflict.clone());
        }

        ChangeProcessResult {
            success: true,
            has_conflict: conflict.is_some(),
            conflict,
            processed_change: Some(change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::types::ChangeType;
    use chrono::Duration;
    use serde_json::json;

    fn change(field: &str, user: &str, value: &str) -> FieldChange {
        let name = user.to_uppercase();
        FieldChange::new(field, None, Some(json!(value)), user, &name, ChangeType::Update)
    }

    fn session(now: DateTime<Utc>) -> CollaborationSession {
        CollaborationSession::new(SessionKey::new("Employee", "42"), now)
    }

    #[test]
    fn versions_increase_by_one() {
        let policy = CollabPolicy::default();
        let now = Utc::now();
        let mut s = session(now);

        let versions: Vec<u64> = (0..4)
            .filter_map(|i| {
                s.record_change(&policy, change("name", "a", &i.to_string()), now)
                    .processed_change
            })
            .map(|c| c.version)
            .collect();

        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(s.current_version, 4);
    }

    #[test]
    fn same_user_never_conflicts_with_itself() {
        let policy = CollabPolicy::default();
        let now = Utc::now();
        let mut s = session(now);

        s.record_change(&policy, change("status", "a", "active"), now);
        let second = s.record_change(&policy, change("status", "a", "inactive"), now);

        assert!(second.success);
        assert!(!second.has_conflict);
        assert!(s.conflicts.is_empty());
    }

    #[test]
    fn other_fields_do_not_conflict() {
        let policy = CollabPolicy::default();
        let now = Utc::now();
        let mut s = session(now);

        s.record_change(&policy, change("status", "a", "active"), now);
        let result = s.record_change(&policy, change("title", "b", "Lead"), now);
        assert!(!result.has_conflict);
    }

    #[test]
    fn conflict_lists_incoming_first_then_newest_matches() {
        let policy = CollabPolicy::default();
        let now = Utc::now();
        let mut s = session(now);

        s.record_change(&policy, change("status", "a", "one"), now);
        s.record_change(&policy, change("status", "c", "two"), now + Duration::seconds(1));
        let later = now + Duration::seconds(2);
        let result = s.record_change(&policy, change("status", "b", "three"), later);

        assert!(result.has_conflict);
        let conflict = result.conflict.expect("conflict");
        let users: Vec<&str> = conflict
            .conflicting_changes
            .iter()
            .map(|c| c.user_id.as_str())
            .collect();
        assert_eq!(users, vec!["b", "c", "a"]);
        assert_eq!(conflict.status, ConflictStatus::Pending);
        assert_eq!(s.conflicts.len(), 1);
        assert_eq!(s.change_history.len(), 3);
    }

    #[test]
    fn scan_is_bounded_by_depth() {
        let policy = CollabPolicy {
            conflict_scan_depth: 2,
            ..CollabPolicy::default()
        };
        let now = Utc::now();
        let mut s = session(now);
        for user in ["a", "c", "d", "e"] {
            s.record_change(&policy, change("status", user, user), now);
        }

        let result = s.record_change(&policy, change("status", "b", "b"), now);
        let conflict = result.conflict.expect("conflict");
        assert_eq!(conflict.conflicting_changes.len(), 3);
    }

    #[test]
    fn changes_outside_window_do_not_conflict() {
        let policy = CollabPolicy::default();
        let now = Utc::now();
        let mut s = session(now);

        s.record_change(&policy, change("status", "a", "active"), now);
        let later = now + Duration::seconds(31);
        let result = s.record_change(&policy, change("status", "b", "inactive"), later);

        assert!(result.success);
        assert!(!result.has_conflict);
        assert!(result.conflict.is_none());
    }
}
