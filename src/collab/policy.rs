use chrono::{DateTime, Duration, Utc};

use super::session::CollaborationSession;
use super::types::{CollaborationUser, FieldLock};

/// Participants idle longer than this are evicted by the sweep.
pub const SESSION_TIMEOUT_SECS: i64 = 30 * 60;
/// Lifetime of a field lock between renewals.
pub const LOCK_TIMEOUT_SECS: i64 = 5 * 60;
/// A typing flag older than this is no longer reported.
pub const TYPING_TIMEOUT_SECS: i64 = 10;
/// Changes to the same field by different users inside this window conflict.
pub const CONFLICT_WINDOW_SECS: i64 = 30;
/// Upper bound on how many recent foreign changes a conflict carries.
pub const CONFLICT_SCAN_DEPTH: usize = 5;

/// Timeouts and conflict heuristics used by the coordinator.
///
/// Every expiry check in the crate goes through one of the predicates below so
/// that the sweep and the inline checks agree on what "expired" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollabPolicy {
    pub session_timeout: Duration,
    pub lock_timeout: Duration,
    pub typing_timeout: Duration,
    pub conflict_window: Duration,
    pub conflict_scan_depth: usize,
}

impl Default for CollabPolicy {
    fn default() -> Self {
        Self {
            session_timeout: Duration::seconds(SESSION_TIMEOUT_SECS),
            lock_timeout: Duration::seconds(LOCK_TIMEOUT_SECS),
            typing_timeout: Duration::seconds(TYPING_TIMEOUT_SECS),
            conflict_window: Duration::seconds(CONFLICT_WINDOW_SECS),
            conflict_scan_depth: CONFLICT_SCAN_DEPTH,
        }
    }
}

impl CollabPolicy {
    /// Saturates at the latest representable instant.
    pub fn lock_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.lock_timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_lock_expired(&self, lock: &FieldLock, now: DateTime<Utc>) -> bool {
        now > lock.expires_at
    }

    pub fn is_participant_expired(&self, user: &CollaborationUser, now: DateTime<Utc>) -> bool {
        now - user.last_activity > self.session_timeout
    }

    pub fn is_typing_stale(&self, typed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - typed_at > self.typing_timeout
    }

    /// An empty session that has seen no activity for the session timeout.
    pub fn is_session_idle(&self, session: &CollaborationSession, now: DateTime<Utc>) -> bool {
        session.participants.is_empty() && now - session.last_activity > self.session_timeout
    }

    pub fn is_within_conflict_window(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - at <= self.conflict_window
    }
}
