use std::collections::HashSet;

use dashmap::DashMap;

use super::types::SessionKey;

/// Reverse index from a user to the sessions it participates in.
///
/// Derived from session membership; it may lag behind briefly but never
/// lists a session the user was never part of.
#[derive(Debug, Default)]
pub struct UserSessionIndex {
    entries: DashMap<String, HashSet<SessionKey>>,
}

impl UserSessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user_id: &str, key: &SessionKey) {
        self.entries
            .entry(user_id.to_string())
            .or_default()
            .insert(key.clone());
    }

    /// Removes one session from the user's set, dropping the entry once empty.
    pub fn remove(&self, user_id: &str, key: &SessionKey) {
        if let Some(mut keys) = self.entries.get_mut(user_id) {
            keys.remove(key);
        }
        self.entries.remove_if(user_id, |_, keys| keys.is_empty());
    }

    pub fn sessions_of(&self, user_id: &str) -> Vec<SessionKey> {
        self.entries
            .get(user_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keeps only the keys for which `is_valid(user, key)` holds and drops
    /// entries left empty. Returns how many keys were pruned.
    pub fn prune(&self, is_valid: impl Fn(&str, &SessionKey) -> bool) -> usize {
        let snapshot: Vec<(String, Vec<SessionKey>)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect();

        let mut pruned = 0;
        for (user_id, keys) in snapshot {
            for key in keys.iter().filter(|key| !is_valid(user_id.as_str(), *key)) {
                self.remove(&user_id, key);
                pruned += 1;
            }
        }
        pruned
    }

    pub fn user_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_prunes_empty_entry() {
        let index = UserSessionIndex::new();
        let key = SessionKey::new("Employee", "42");
        index.add("u1", &key);
        assert_eq!(index.sessions_of("u1"), vec![key.clone()]);

        index.remove("u1", &key);
        assert!(index.sessions_of("u1").is_empty());
        assert_eq!(index.user_count(), 0);
    }

    #[test]
    fn prune_drops_only_invalid_keys() {
        let index = UserSessionIndex::new();
        let live = SessionKey::new("Employee", "1");
        let dead = SessionKey::new("Employee", "2");
        index.add("u1", &live);
        index.add("u1", &dead);
        index.add("u2", &dead);

        let pruned = index.prune(|_, key| key == &live);

        assert_eq!(pruned, 2);
        assert_eq!(index.sessions_of("u1"), vec![live]);
        assert_eq!(index.user_count(), 1);
    }
}
