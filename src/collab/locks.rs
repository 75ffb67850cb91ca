use chrono::{DateTime, Utc};
use tracing::debug;

use super::policy::CollabPolicy;
use super::session::CollaborationSession;
use super::types::{FieldLock, LockResult};

impl CollaborationSession {
    /// Acquires, extends or reclaims the lock on `field_name` for `user_id`.
    ///
    /// A live lock held by someone else is never taken over; the caller gets
    /// the holder's lock back instead.
    pub(crate) fn acquire_lock(
        &mut self,
        policy: &CollabPolicy,
        field_name: &str,
        user_id: &str,
        user_name: &str,
        now: DateTime<Utc>,
    ) -> LockResult {
        if let Some(existing) = self.field_locks.get_mut(field_name) {
            if existing.user_id == user_id {
                existing.expires_at = policy.lock_expires_at(now);
                let lock = existing.clone();
                self.touch_user(user_id, now);
                return LockResult {
                    success: true,
                    message: "Lock extended".to_string(),
                    lock: Some(lock),
                };
            }

            if !policy.is_lock_expired(existing, now) {
                return LockResult {
                    success: false,
                    message: format!("Field is locked by {}", existing.user_name),
                    lock: Some(existing.clone()),
                };
            }

            debug!(
                "Reclaiming expired lock on {} in {} from {}",
                field_name, self.key, existing.user_id
            );
            self.field_locks.remove(field_name);
        }

        let lock = FieldLock {
            field_name: field_name.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            locked_at: now,
            expires_at: policy.lock_expires_at(now),
        };
        self.field_locks.insert(field_name.to_string(), lock.clone());
        self.touch_user(user_id, now);

        LockResult {
            success: true,
            message: "Lock acquired".to_string(),
            lock: Some(lock),
        }
    }

    /// Releases the lock if `user_id` owns it or it has already expired.
    pub(crate) fn release_lock(
        &mut self,
        policy: &CollabPolicy,
        field_name: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<FieldLock> {
        let lock = self.field_locks.get(field_name)?;
        if lock.user_id != user_id && !policy.is_lock_expired(lock, now) {
            return None;
        }
        let released = self.field_locks.remove(field_name);
        self.touch_user(user_id, now);
        released
    }

    pub(crate) fn release_locks_held_by(&mut self, user_id: &str) -> Vec<FieldLock> {
        let fields: Vec<String> = self
            .field_locks
            .values()
            .filter(|lock| lock.user_id == user_id)
            .map(|lock| lock.field_name.clone())
            .collect();
        fields
            .iter()
            .filter_map(|field| self.field_locks.remove(field))
            .collect()
    }

    pub(crate) fn evict_expired_locks(
        &mut self,
        policy: &CollabPolicy,
        now: DateTime<Utc>,
    ) -> Vec<FieldLock> {
        let expired: Vec<String> = self
            .field_locks
            .values()
            .filter(|lock| policy.is_lock_expired(lock, now))
            .map(|lock| lock.field_name.clone())
            .collect();
        expired
            .iter()
            .filter_map(|field| self.field_locks.remove(field))
            .collect()
    }

    /// Locks that are still in force, ordered by field name.
    pub fn active_locks(&self, policy: &CollabPolicy, now: DateTime<Utc>) -> Vec<FieldLock> {
        let mut locks: Vec<FieldLock> = self
            .field_locks
            .values()
            .filter(|lock| !policy.is_lock_expired(lock, now))
            .cloned()
            .collect();
        locks.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        locks
    }
}
