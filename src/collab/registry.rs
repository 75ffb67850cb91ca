use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::session::CollaborationSession;
use super::types::SessionKey;

pub type SharedSession = Arc<Mutex<CollaborationSession>>;

/// Owns every live session, keyed by entity.
///
/// Lock order is always session mutex before registry shard; the registry
/// never locks a session while holding one of its own shard guards.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, SharedSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `key`, creating it atomically if missing.
    pub fn get_or_create(&self, key: &SessionKey, now: DateTime<Utc>) -> SharedSession {
        if let Some(session) = self.sessions.get(key) {
            return session.value().clone();
        }
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CollaborationSession::new(key.clone(), now))))
            .value()
            .clone()
    }

    pub fn get(&self, key: &SessionKey) -> Option<SharedSession> {
        self.sessions.get(key).map(|session| session.value().clone())
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Removes the session if nobody participates in it. Returns whether it
    /// was removed.
    pub fn remove(&self, key: &SessionKey) -> bool {
        let Some(session) = self.get(key) else {
            return false;
        };
        if !session.lock().close() {
            return false;
        }
        self.discard(key, &session)
    }

    /// Drops an already closed session. A newer session under the same key is
    /// left alone.
    pub(crate) fn discard(&self, key: &SessionKey, session: &SharedSession) -> bool {
        self.sessions
            .remove_if(key, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Point-in-time list of sessions, so callers can lock them without
    /// holding any shard guard.
    pub fn entries(&self) -> Vec<(SessionKey, SharedSession)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("Employee", "42");
        let now = Utc::now();

        let first = registry.get_or_create(&key, now);
        let second = registry.get_or_create(&key, now);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_creators_observe_one_instance() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("Employee", "7");
        let now = Utc::now();

        let sessions: Vec<SharedSession> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.get_or_create(&key, now)))
                .collect();
            handles.into_iter().filter_map(|h| h.join().ok()).collect()
        });

        assert_eq!(sessions.len(), 8);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[test]
    fn remove_is_refused_for_active_session() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("Employee", "42");
        let now = Utc::now();

        registry.get_or_create(&key, now).lock().join("u1", "Alice", "conn-1", now);
        assert!(!registry.remove(&key));
        assert!(registry.contains(&key));
    }

    #[test]
    fn remove_drops_empty_session() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("Employee", "42");
        registry.get_or_create(&key, Utc::now());

        assert!(registry.remove(&key));
        assert!(registry.get(&key).is_none());
        assert!(!registry.remove(&key));
    }

    #[test]
    fn keys_with_delimiters_stay_distinct() {
        let registry = SessionRegistry::new();
        let now = Utc::now();
        let a = registry.get_or_create(&SessionKey::new("Employee_A", "1"), now);
        let b = registry.get_or_create(&SessionKey::new("Employee", "A_1"), now);

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }
}
