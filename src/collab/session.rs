use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::policy::CollabPolicy;
use super::types::{
    CollaborationUser, ConflictInfo, ConflictStatus, FieldChange, FieldLock, SessionKey,
    TypingUser, UserStatus,
};

/// In-flight edit state for every editor of one entity.
///
/// Only the coordinator mutates a session, always while holding the session's
/// mutex. A `closed` session has been (or is about to be) dropped from the
/// registry and must not be mutated further.
#[derive(Debug)]
pub struct CollaborationSession {
    pub(crate) key: SessionKey,
    pub(crate) participants: HashMap<String, CollaborationUser>,
    pub(crate) field_locks: HashMap<String, FieldLock>,
    pub(crate) change_history: Vec<FieldChange>,
    pub(crate) conflicts: Vec<ConflictInfo>,
    pub(crate) current_version: u64,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) last_activity: DateTime<Utc>,
    closed: bool,
}

/// Evictions performed on one session by a sweep.
#[derive(Debug, Default)]
pub(crate) struct SessionEviction {
    pub participants: Vec<String>,
    pub locks: usize,
    pub typing_flags: usize,
}

impl CollaborationSession {
    pub fn new(key: SessionKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            participants: HashMap::new(),
            field_locks: HashMap::new(),
            change_history: Vec::new(),
            conflicts: Vec::new(),
            current_version: 0,
            started_at: now,
            last_activity: now,
            closed: false,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the session as gone. Only allowed once nobody participates.
    pub(crate) fn close(&mut self) -> bool {
        if self.participants.is_empty() {
            self.closed = true;
        }
        self.closed
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub(crate) fn touch_user(&mut self, user_id: &str, now: DateTime<Utc>) {
        if let Some(user) = self.participants.get_mut(user_id) {
            user.last_activity = now;
        }
        self.touch(now);
    }

    /// Adds or replaces the participant entry for `user_id`. Last join wins.
    pub(crate) fn join(
        &mut self,
        user_id: &str,
        user_name: &str,
        connection_id: &str,
        now: DateTime<Utc>,
    ) -> CollaborationUser {
        let user = CollaborationUser::new(user_id, user_name, connection_id, now);
        self.participants.insert(user_id.to_string(), user.clone());
        self.touch(now);
        user
    }

    pub fn participant(&self, user_id: &str) -> Option<&CollaborationUser> {
        self.participants.get(user_id)
    }

    /// Removes the participant and every lock it holds. Returns the released
    /// locks, or `None` if the user was not a participant.
    pub(crate) fn remove_participant(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Vec<FieldLock>> {
        self.participants.remove(user_id)?;
        let released = self.release_locks_held_by(user_id);
        self.touch(now);
        Some(released)
    }

    pub(crate) fn set_typing(
        &mut self,
        field_name: &str,
        user_id: &str,
        is_typing: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(user) = self.participants.get_mut(user_id) else {
            return false;
        };
        if is_typing {
            user.typing_fields.insert(field_name.to_string(), now);
        } else {
            user.typing_fields.remove(field_name);
        }
        self.touch_user(user_id, now);
        true
    }

    pub(crate) fn set_status(
        &mut self,
        user_id: &str,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> Option<CollaborationUser> {
        let user = self.participants.get_mut(user_id)?;
        user.status = status;
        user.last_activity = now;
        let user = user.clone();
        self.touch(now);
        Some(user)
    }

    /// Participants ordered by join time.
    pub fn online_users(&self) -> Vec<CollaborationUser> {
        let mut users: Vec<CollaborationUser> = self.participants.values().cloned().collect();
        users.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.user_id.cmp(&b.user_id)));
        users
    }

    /// Typing flags that are still fresh, optionally restricted to one field.
    pub fn typing_users(
        &self,
        policy: &CollabPolicy,
        field_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<TypingUser> {
        let mut typing: Vec<TypingUser> = self
            .participants
            .values()
            .flat_map(|user| {
                user.typing_fields.iter().map(move |(field, since)| TypingUser {
                    user_id: user.user_id.clone(),
                    user_name: user.user_name.clone(),
                    field_name: field.clone(),
                    since: *since,
                })
            })
            .filter(|t| field_name.map_or(true, |f| f == t.field_name))
            .filter(|t| !policy.is_typing_stale(t.since, now))
            .collect();
        typing.sort_by(|a, b| a.since.cmp(&b.since).then_with(|| a.user_id.cmp(&b.user_id)));
        typing
    }

    /// Records an external resolution decision on a detected conflict.
    pub(crate) fn resolve_conflict(
        &mut self,
        conflict_id: Uuid,
        status: ConflictStatus,
        resolved_by: &str,
        resolved_value: Option<Value>,
        now: DateTime<Utc>,
    ) -> Option<ConflictInfo> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.conflict_id == conflict_id)?;
        conflict.status = status;
        conflict.resolved_by = Some(resolved_by.to_string());
        conflict.resolved_at = Some(now);
        conflict.resolved_value = resolved_value;
        let conflict = conflict.clone();
        self.touch(now);
        Some(conflict)
    }

    /// Drops idle participants (with their locks), expired locks and stale
    /// typing flags. Does not touch `last_activity`.
    pub(crate) fn evict_expired(
        &mut self,
        policy: &CollabPolicy,
        now: DateTime<Utc>,
    ) -> SessionEviction {
        let mut eviction = SessionEviction::default();

        let idle: Vec<String> = self
            .participants
            .values()
            .filter(|user| policy.is_participant_expired(user, now))
            .map(|user| user.user_id.clone())
            .collect();
        for user_id in idle {
            self.participants.remove(&user_id);
            eviction.locks += self.release_locks_held_by(&user_id).len();
            eviction.participants.push(user_id);
        }

        eviction.locks += self.evict_expired_locks(policy, now).len();

        for user in self.participants.values_mut() {
            let before = user.typing_fields.len();
            user.typing_fields
                .retain(|_, typed_at| !policy.is_typing_stale(*typed_at, now));
            eviction.typing_flags += before - user.typing_fields.len();
        }

        eviction
    }

    /// Locks past their deadline are left out, matching `active_locks`.
    pub fn snapshot(&self, policy: &CollabPolicy, now: DateTime<Utc>) -> SessionSnapshot {
        let field_locks = self.active_locks(policy, now);
        SessionSnapshot {
            entity_type: self.key.entity_type.clone(),
            entity_id: self.key.entity_id.clone(),
            participants: self.online_users(),
            field_locks,
            change_history: self.change_history.clone(),
            conflicts: self.conflicts.clone(),
            current_version: self.current_version,
            started_at: self.started_at,
            last_activity: self.last_activity,
        }
    }
}

/// Owned copy of a session, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub entity_type: String,
    pub entity_id: String,
    pub participants: Vec<CollaborationUser>,
    pub field_locks: Vec<FieldLock>,
    pub change_history: Vec<FieldChange>,
    pub conflicts: Vec<ConflictInfo>,
    pub current_version: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
