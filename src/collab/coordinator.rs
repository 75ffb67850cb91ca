use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::policy::CollabPolicy;
use super::registry::SessionRegistry;
use super::session::{CollaborationSession, SessionSnapshot};
use super::types::{
    ChangeProcessResult, CollaborationUser, ConflictInfo, ConflictStatus, FieldChange, FieldLock,
    LeaveResult, LockResult, SessionKey, SweepReport, TypingUser, UserStatus,
};
use super::user_index::UserSessionIndex;

/// Aggregate counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStats {
    pub sessions: usize,
    pub participants: usize,
    pub field_locks: usize,
    pub indexed_users: usize,
}

/// Coordinates concurrent editors of the same records.
///
/// All methods are synchronous and short. Each one locks at most one session
/// at a time; the session mutex is taken before any registry or index shard.
/// Expected races (unknown session, missing lock, stale disconnect) produce a
/// neutral result instead of an error.
pub struct CollaborationCoordinator {
    registry: SessionRegistry,
    user_index: UserSessionIndex,
    policy: CollabPolicy,
    clock: Arc<dyn Clock>,
}

impl CollaborationCoordinator {
    pub fn new(policy: CollabPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            user_index: UserSessionIndex::new(),
            policy,
            clock,
        }
    }

    pub fn with_policy(policy: CollabPolicy) -> Self {
        Self::new(policy, Arc::new(SystemClock))
    }

    pub fn policy(&self) -> &CollabPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs `f` on the live session for `key`, creating it if needed.
    fn with_session<R>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut CollaborationSession, DateTime<Utc>) -> R,
    ) -> R {
        loop {
            let session = self.registry.get_or_create(key, self.now());
            let mut guard = session.lock();
            if guard.is_closed() {
                drop(guard);
                self.registry.discard(key, &session);
                continue;
            }
            let now = self.now();
            return f(&mut *guard, now);
        }
    }

    /// Runs `f` on the session for `key` only if it exists.
    fn with_existing_session<R>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut CollaborationSession, DateTime<Utc>) -> R,
    ) -> Option<R> {
        let session = self.registry.get(key)?;
        let mut guard = session.lock();
        if guard.is_closed() {
            return None;
        }
        let now = self.now();
        Some(f(&mut *guard, now))
    }

    pub fn join_session(
        &self,
        entity_type: &str,
        entity_id: &str,
        user_id: &str,
        user_name: &str,
        connection_id: &str,
    ) -> Option<CollaborationUser> {
        let key = SessionKey::new(entity_type, entity_id);
        if !key.is_valid() || user_id.is_empty() {
            warn!("Ignoring join with empty identifiers: {} user='{}'", key, user_id);
            return None;
        }

        let user = self.with_session(&key, |session, now| {
            let user = session.join(user_id, user_name, connection_id, now);
            self.user_index.add(user_id, &key);
            user
        });
        info!("User {} joined {} on connection {}", user_id, key, connection_id);
        Some(user)
    }

    pub fn leave_session(
        &self,
        entity_type: &str,
        entity_id: &str,
        user_id: &str,
        connection_id: &str,
    ) -> LeaveResult {
        let key = SessionKey::new(entity_type, entity_id);
        let result = self.leave(&key, user_id, None);
        if result.left {
            info!("User {} left {} (connection {})", user_id, key, connection_id);
        }
        result
    }

    /// Shared leave path. With `connection_id` set, the participant is only
    /// removed if it is still bound to that connection.
    fn leave(&self, key: &SessionKey, user_id: &str, connection_id: Option<&str>) -> LeaveResult {
        // Index entries are only touched under a live session's mutex. Without
        // one, a concurrent join may already own a fresh entry for this key;
        // stale entries are left to the sweep's prune.
        let Some(session) = self.registry.get(key) else {
            return LeaveResult::default();
        };

        let mut guard = session.lock();
        if guard.is_closed() {
            return LeaveResult::default();
        }

        if let (Some(expected), Some(current)) = (connection_id, guard.participant(user_id)) {
            if current.connection_id != expected {
                debug!(
                    "Ignoring stale disconnect of {} from {}: connection {} was replaced by {}",
                    user_id, key, expected, current.connection_id
                );
                return LeaveResult::default();
            }
        }

        let now = self.now();
        let Some(released_locks) = guard.remove_participant(user_id, now) else {
            drop(guard);
            self.user_index.remove(user_id, key);
            return LeaveResult::default();
        };
        self.user_index.remove(user_id, key);
        let session_closed = guard.close();
        drop(guard);

        if session_closed {
            self.registry.discard(key, &session);
            debug!("Session {} closed after last participant left", key);
        }

        LeaveResult {
            left: true,
            released_locks,
            session_closed,
        }
    }

    pub fn get_online_users(&self, entity_type: &str, entity_id: &str) -> Vec<CollaborationUser> {
        let key = SessionKey::new(entity_type, entity_id);
        self.with_existing_session(&key, |session, _| session.online_users())
            .unwrap_or_default()
    }

    pub fn lock_field(
        &self,
        entity_type: &str,
        entity_id: &str,
        field_name: &str,
        user_id: &str,
        user_name: &str,
    ) -> LockResult {
        let key = SessionKey::new(entity_type, entity_id);
        if !key.is_valid() || field_name.is_empty() || user_id.is_empty() {
            warn!("Ignoring lock request with empty identifiers on {}", key);
            return LockResult {
                success: false,
                message: "Invalid lock request".to_string(),
                lock: None,
            };
        }

        let result = self.with_session(&key, |session, now| {
            session.acquire_lock(&self.policy, field_name, user_id, user_name, now)
        });
        if result.success {
            debug!("{} on {}.{} for {}", result.message, key, field_name, user_id);
        } else {
            debug!("Lock on {}.{} refused for {}: {}", key, field_name, user_id, result.message);
        }
        result
    }

    /// Returns the released lock, if any.
    pub fn unlock_field(
        &self,
        entity_type: &str,
        entity_id: &str,
        field_name: &str,
        user_id: &str,
    ) -> Option<FieldLock> {
        let key = SessionKey::new(entity_type, entity_id);
        let released = self
            .with_existing_session(&key, |session, now| {
                session.release_lock(&self.policy, field_name, user_id, now)
            })
            .flatten();
        if released.is_some() {
            debug!("Lock on {}.{} released by {}", key, field_name, user_id);
        }
        released
    }

    pub fn get_field_locks(&self, entity_type: &str, entity_id: &str) -> Vec<FieldLock> {
        let key = SessionKey::new(entity_type, entity_id);
        self.with_existing_session(&key, |session, now| session.active_locks(&self.policy, now))
            .unwrap_or_default()
    }

    /// Versions and records a change. Fails only when no session exists.
    pub fn process_field_change(
        &self,
        entity_type: &str,
        entity_id: &str,
        change: FieldChange,
    ) -> ChangeProcessResult {
        let key = SessionKey::new(entity_type, entity_id);
        let field_name = change.field_name.clone();
        let Some(result) = self.with_existing_session(&key, |session, now| {
            session.record_change(&self.policy, change, now)
        }) else {
            warn!("Change to {}.{} rejected: no active session", key, field_name);
            return ChangeProcessResult::rejected();
        };

        if let Some(conflict) = &result.conflict {
            info!(
                "Conflict {} on {}.{} between {} changes",
                conflict.conflict_id,
                key,
                field_name,
                conflict.conflicting_changes.len()
            );
        }
        result
    }

    pub fn set_user_typing(
        &self,
        entity_type: &str,
        entity_id: &str,
        field_name: &str,
        user_id: &str,
        is_typing: bool,
    ) -> bool {
        let key = SessionKey::new(entity_type, entity_id);
        self.with_existing_session(&key, |session, now| {
            session.set_typing(field_name, user_id, is_typing, now)
        })
        .unwrap_or(false)
    }

    pub fn get_typing_users(
        &self,
        entity_type: &str,
        entity_id: &str,
        field_name: Option<&str>,
    ) -> Vec<TypingUser> {
        let key = SessionKey::new(entity_type, entity_id);
        self.with_existing_session(&key, |session, now| {
            session.typing_users(&self.policy, field_name, now)
        })
        .unwrap_or_default()
    }

    pub fn update_user_status(
        &self,
        entity_type: &str,
        entity_id: &str,
        user_id: &str,
        status: UserStatus,
    ) -> Option<CollaborationUser> {
        let key = SessionKey::new(entity_type, entity_id);
        self.with_existing_session(&key, |session, now| session.set_status(user_id, status, now))
            .flatten()
    }

    pub fn resolve_conflict(
        &self,
        entity_type: &str,
        entity_id: &str,
        conflict_id: Uuid,
        status: ConflictStatus,
        resolved_by: &str,
        resolved_value: Option<Value>,
    ) -> Option<ConflictInfo> {
        let key = SessionKey::new(entity_type, entity_id);
        let conflict = self
            .with_existing_session(&key, |session, now| {
                session.resolve_conflict(conflict_id, status, resolved_by, resolved_value, now)
            })
            .flatten();
        if conflict.is_some() {
            info!("Conflict {} on {} marked {:?} by {}", conflict_id, key, status, resolved_by);
        }
        conflict
    }

    /// Leaves every session where `user_id` is still bound to `connection_id`.
    /// Returns only the sessions actually left.
    pub fn handle_user_disconnect(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Vec<(SessionKey, LeaveResult)> {
        let departures: Vec<(SessionKey, LeaveResult)> = self
            .user_index
            .sessions_of(user_id)
            .into_iter()
            .map(|key| {
                let result = self.leave(&key, user_id, Some(connection_id));
                (key, result)
            })
            .filter(|(_, result)| result.left)
            .collect();

        info!(
            "User {} disconnected (connection {}), left {} session(s)",
            user_id,
            connection_id,
            departures.len()
        );
        departures
    }

    pub fn get_session(&self, entity_type: &str, entity_id: &str) -> Option<SessionSnapshot> {
        let key = SessionKey::new(entity_type, entity_id);
        self.with_existing_session(&key, |session, now| session.snapshot(&self.policy, now))
    }

    /// One sweep over every session: idle participants, expired locks, stale
    /// typing flags, then empty idle sessions and dangling index entries.
    pub fn cleanup_expired_sessions(&self) -> SweepReport {
        let now = self.now();
        let mut report = SweepReport::default();

        for (key, session) in self.registry.entries() {
            let mut guard = session.lock();
            if guard.is_closed() {
                drop(guard);
                self.registry.discard(&key, &session);
                continue;
            }

            let eviction = guard.evict_expired(&self.policy, now);
            for user_id in &eviction.participants {
                self.user_index.remove(user_id, &key);
            }
            report.participants_evicted += eviction.participants.len();
            report.locks_evicted += eviction.locks;
            report.typing_flags_cleared += eviction.typing_flags;

            let idle = self.policy.is_session_idle(&guard, now) && guard.close();
            drop(guard);
            if idle && self.registry.discard(&key, &session) {
                report.sessions_removed += 1;
            }
        }

        report.index_entries_pruned = self.user_index.prune(|user_id, key| {
            self.registry.get(key).map_or(false, |session| {
                let guard = session.lock();
                !guard.is_closed() && guard.participant(user_id).is_some()
            })
        });

        if !report.is_empty() {
            info!("Sweep: {:?}", report);
        }
        report
    }

    pub fn stats(&self) -> CoordinatorStats {
        let mut stats = CoordinatorStats {
            indexed_users: self.user_index.user_count(),
            ..CoordinatorStats::default()
        };
        for (_, session) in self.registry.entries() {
            let guard = session.lock();
            if guard.is_closed() {
                continue;
            }
            stats.sessions += 1;
            stats.participants += guard.participants.len();
            stats.field_locks += guard.field_locks.len();
        }
        stats
    }
}
