use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::collab::{CollaborationCoordinator, FieldChange, LeaveResult, SessionKey};
use crate::models::messages::*;
use super::connctx::{ConnCtx, ConnCtxCache};

/// Transport side of the coordinator: turns client messages into coordinator
/// calls and fans the results out to the other participants' connections.
pub struct CollabHub {
    coordinator: Arc<CollaborationCoordinator>,
    connections: ConnCtxCache,
}

impl CollabHub {
    pub fn new(coordinator: Arc<CollaborationCoordinator>) -> Self {
        Self {
            coordinator,
            connections: ConnCtxCache::new(),
        }
    }

    pub fn coordinator(&self) -> &Arc<CollaborationCoordinator> {
        &self.coordinator
    }

    pub fn connections(&self) -> &ConnCtxCache {
        &self.connections
    }

    pub fn register(&self, connection_id: &str, ctx: ConnCtx) {
        info!("Connection {} registered for user {}", connection_id, ctx.user_id);
        self.connections.insert(connection_id, ctx);
    }

    fn encode(msg: &SendMessage) -> Option<String> {
        match serde_json::to_string(msg) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to serialize outgoing message: {}", e);
                None
            }
        }
    }

    fn send_to(&self, connection_id: &str, msg: &SendMessage) {
        if let Some(text) = Self::encode(msg) {
            self.connections.send(connection_id, &text);
        }
    }

    /// Sends to every participant of the session, optionally skipping one
    /// connection (usually the sender).
    fn broadcast(&self, key: &SessionKey, except: Option<&str>, msg: &SendMessage) {
        let Some(text) = Self::encode(msg) else {
            return;
        };
        for user in self.coordinator.get_online_users(&key.entity_type, &key.entity_id) {
            if Some(user.connection_id.as_str()) == except {
                continue;
            }
            self.connections.send(&user.connection_id, &text);
        }
    }

    fn broadcast_departure(&self, key: &SessionKey, user_id: &str, result: LeaveResult) {
        if !result.left || result.session_closed {
            return;
        }
        let msg = SendMessage::UserLeft(UserLeftMessage {
            entity_type: key.entity_type.clone(),
            entity_id: key.entity_id.clone(),
            user_id: user_id.to_string(),
            released_locks: result.released_locks,
        });
        self.broadcast(key, None, &msg);
    }

    fn reply_error(&self, connection_id: &str, message: impl Into<String>) {
        let msg = SendMessage::Error(ErrorMessage { message: message.into() });
        self.send_to(connection_id, &msg);
    }

    /// Handles one raw text frame from a client.
    pub fn handle_text(&self, connection_id: &str, text: &str) {
        match serde_json::from_str::<ReceivedMessage>(text) {
            Ok(msg) => self.dispatch(connection_id, msg),
            Err(e) => {
                warn!("Failed to parse message on connection {}: {}", connection_id, e);
                self.reply_error(connection_id, format!("Invalid message: {}", e));
            }
        }
    }

    pub fn dispatch(&self, connection_id: &str, msg: ReceivedMessage) {
        let Some(ctx) = self.connections.get(connection_id) else {
            warn!("Message on unknown connection {}", connection_id);
            return;
        };
        let user_id = ctx.user_id.as_str();
        let user_name = ctx.user_name.as_str();

        match msg {
            ReceivedMessage::Join(m) => {
                let key = SessionKey::new(m.entity_type, m.entity_id);
                let Some(user) = self.coordinator.join_session(
                    &key.entity_type,
                    &key.entity_id,
                    user_id,
                    user_name,
                    connection_id,
                ) else {
                    self.reply_error(
                        connection_id,
                        "Cannot join: entity type and id are required",
                    );
                    return;
                };
                let joined = SendMessage::Joined(JoinedMessage {
                    entity_type: key.entity_type.clone(),
                    entity_id: key.entity_id.clone(),
                    user: user.clone(),
                    online_users: self
                        .coordinator
                        .get_online_users(&key.entity_type, &key.entity_id),
                    locks: self
                        .coordinator
                        .get_field_locks(&key.entity_type, &key.entity_id),
                });
                self.send_to(connection_id, &joined);
                let announce = SendMessage::UserJoined(UserPresenceMessage {
                    entity_type: key.entity_type.clone(),
                    entity_id: key.entity_id.clone(),
                    user,
                });
                self.broadcast(&key, Some(connection_id), &announce);
            }
            ReceivedMessage::Leave(m) => {
                let key = SessionKey::new(m.entity_type, m.entity_id);
                let result = self.coordinator.leave_session(
                    &key.entity_type,
                    &key.entity_id,
                    user_id,
                    connection_id,
                );
                self.broadcast_departure(&key, user_id, result);
            }
            ReceivedMessage::LockField(m) => {
                let result = self.coordinator.lock_field(
                    &m.entity_type,
                    &m.entity_id,
                    &m.field_name,
                    user_id,
                    user_name,
                );
                let key = SessionKey::new(m.entity_type, m.entity_id);
                match (result.success, result.lock) {
                    (true, Some(lock)) => {
                        let msg = SendMessage::FieldLocked(FieldLockedMessage {
                            entity_type: key.entity_type.clone(),
                            entity_id: key.entity_id.clone(),
                            lock,
                        });
                        self.broadcast(&key, None, &msg);
                    }
                    (_, lock) => {
                        let msg = SendMessage::LockRejected(LockRejectedMessage {
                            entity_type: key.entity_type.clone(),
                            entity_id: key.entity_id.clone(),
                            field_name: m.field_name,
                            message: result.message,
                            lock,
                        });
                        self.send_to(connection_id, &msg);
                    }
                }
            }
            ReceivedMessage::UnlockField(m) => {
                if self
                    .coordinator
                    .unlock_field(&m.entity_type, &m.entity_id, &m.field_name, user_id)
                    .is_some()
                {
                    let key = SessionKey::new(m.entity_type, m.entity_id);
                    let msg = SendMessage::FieldUnlocked(FieldUnlockedMessage {
                        entity_type: key.entity_type.clone(),
                        entity_id: key.entity_id.clone(),
                        field_name: m.field_name,
                        user_id: user_id.to_string(),
                    });
                    self.broadcast(&key, Some(connection_id), &msg);
                }
            }
            ReceivedMessage::FieldChange(m) => {
                let key = SessionKey::new(m.entity_type, m.entity_id);
                let change = FieldChange::new(
                    &m.field_name,
                    m.old_value,
                    m.new_value,
                    user_id,
                    user_name,
                    m.change_type,
                );
                let result = self
                    .coordinator
                    .process_field_change(&key.entity_type, &key.entity_id, change);
                if !result.success {
                    self.reply_error(
                        connection_id,
                        "Cannot record change: join the session first",
                    );
                    return;
                }
                if let Some(change) = result.processed_change {
                    let msg = SendMessage::FieldChanged(FieldChangedMessage {
                        entity_type: key.entity_type.clone(),
                        entity_id: key.entity_id.clone(),
                        change,
                    });
                    self.broadcast(&key, Some(connection_id), &msg);
                }
                if let Some(conflict) = result.conflict {
                    let msg = SendMessage::ConflictDetected(ConflictMessage { conflict });
                    self.broadcast(&key, None, &msg);
                }
            }
            ReceivedMessage::Typing(m) => {
                if self.coordinator.set_user_typing(
                    &m.entity_type,
                    &m.entity_id,
                    &m.field_name,
                    user_id,
                    m.is_typing,
                ) {
                    let key = SessionKey::new(m.entity_type, m.entity_id);
                    let msg = SendMessage::Typing(TypingBroadcastMessage {
                        entity_type: key.entity_type.clone(),
                        entity_id: key.entity_id.clone(),
                        field_name: m.field_name,
                        user_id: user_id.to_string(),
                        user_name: user_name.to_string(),
                        is_typing: m.is_typing,
                    });
                    self.broadcast(&key, Some(connection_id), &msg);
                }
            }
            ReceivedMessage::Status(m) => {
                let key = SessionKey::new(m.entity_type, m.entity_id);
                if let Some(user) = self.coordinator.update_user_status(
                    &key.entity_type,
                    &key.entity_id,
                    user_id,
                    m.status,
                ) {
                    let msg = SendMessage::StatusChanged(UserPresenceMessage {
                        entity_type: key.entity_type.clone(),
                        entity_id: key.entity_id.clone(),
                        user,
                    });
                    self.broadcast(&key, Some(connection_id), &msg);
                }
            }
            ReceivedMessage::Ping => {
                let pong = SendMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() });
                self.send_to(connection_id, &pong);
            }
        }
    }

    /// Cleans up after a closed socket and tells the remaining participants.
    /// The context may already be gone when the connection was cut off for
    /// being too slow; the coordinator cleanup runs either way.
    pub fn handle_disconnect(&self, connection_id: &str, user_id: &str) {
        self.connections.remove(connection_id);
        let departures = self.coordinator.handle_user_disconnect(user_id, connection_id);
        for (key, result) in departures {
            self.broadcast_departure(&key, user_id, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollabPolicy;
    use serde_json::{json, Value};
    use crate::ws::connctx::OUTBOX_CAPACITY;
    use tokio::sync::mpsc::{channel, error::TryRecvError, Receiver};

    fn hub() -> CollabHub {
        let coordinator = CollaborationCoordinator::with_policy(CollabPolicy::default());
        CollabHub::new(Arc::new(coordinator))
    }

    fn connect_with_capacity(
        hub: &CollabHub,
        connection_id: &str,
        user_id: &str,
        capacity: usize,
    ) -> Receiver<String> {
        let (outbox, rx) = channel(capacity);
        hub.register(connection_id, ConnCtx {
            user_id: user_id.to_string(),
            user_name: user_id.to_uppercase(),
            outbox,
        });
        rx
    }

    fn connect(hub: &CollabHub, connection_id: &str, user_id: &str) -> Receiver<String> {
        connect_with_capacity(hub, connection_id, user_id, OUTBOX_CAPACITY)
    }

    fn drain(rx: &mut Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).expect("valid json"));
        }
        out
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages.iter().filter_map(|m| m["type"].as_str()).collect()
    }

    fn send(hub: &CollabHub, connection_id: &str, msg: Value) {
        hub.handle_text(connection_id, &msg.to_string());
    }

    fn join(hub: &CollabHub, connection_id: &str) {
        let msg = json!({"type": "join", "entityType": "Employee", "entityId": "42"});
        send(hub, connection_id, msg);
    }

    fn lock(hub: &CollabHub, connection_id: &str, field: &str) {
        let msg = json!({
            "type": "lockField",
            "entityType": "Employee",
            "entityId": "42",
            "fieldName": field,
        });
        send(hub, connection_id, msg);
    }

    fn change(hub: &CollabHub, connection_id: &str, field: &str, value: Value) {
        let msg = json!({
            "type": "fieldChange",
            "entityType": "Employee",
            "entityId": "42",
            "fieldName": field,
            "newValue": value,
        });
        send(hub, connection_id, msg);
    }

    #[test]
    fn join_announces_to_others_only() {
        let hub = hub();
        let mut a = connect(&hub, "conn-a", "a");
        let mut b = connect(&hub, "conn-b", "b");

        join(&hub, "conn-a");
        assert_eq!(types(&drain(&mut a)), vec!["joined"]);

        join(&hub, "conn-b");
        let b_msgs = drain(&mut b);
        assert_eq!(types(&b_msgs), vec!["joined"]);
        assert_eq!(b_msgs[0]["onlineUsers"].as_array().map(|u| u.len()), Some(2));
        assert_eq!(types(&drain(&mut a)), vec!["userJoined"]);
    }

    #[test]
    fn lock_rejection_goes_only_to_requester() {
        let hub = hub();
        let mut a = connect(&hub, "conn-a", "a");
        let mut b = connect(&hub, "conn-b", "b");
        join(&hub, "conn-a");
        join(&hub, "conn-b");
        drain(&mut a);
        drain(&mut b);

        lock(&hub, "conn-a", "salary");
        assert_eq!(types(&drain(&mut a)), vec!["fieldLocked"]);
        assert_eq!(types(&drain(&mut b)), vec!["fieldLocked"]);

        lock(&hub, "conn-b", "salary");
        let rejected = drain(&mut b);
        assert_eq!(types(&rejected), vec!["lockRejected"]);
        let message = rejected[0]["message"].as_str().unwrap_or_default();
        assert!(message.contains("locked by A"));
        assert!(drain(&mut a).is_empty());
    }

    #[test]
    fn conflicting_changes_reach_everyone() {
        let hub = hub();
        let mut a = connect(&hub, "conn-a", "a");
        let mut b = connect(&hub, "conn-b", "b");
        join(&hub, "conn-a");
        join(&hub, "conn-b");
        drain(&mut a);
        drain(&mut b);

        change(&hub, "conn-a", "status", json!("Active"));
        assert_eq!(types(&drain(&mut b)), vec!["fieldChanged"]);
        assert!(drain(&mut a).is_empty());

        change(&hub, "conn-b", "status", json!("Suspended"));
        assert_eq!(types(&drain(&mut a)), vec!["fieldChanged", "conflictDetected"]);
        let b_msgs = drain(&mut b);
        assert_eq!(types(&b_msgs), vec!["conflictDetected"]);
        assert_eq!(
            b_msgs[0]["conflict"]["conflictingChanges"].as_array().map(|c| c.len()),
            Some(2)
        );
    }

    #[test]
    fn disconnect_releases_locks_and_notifies() {
        let hub = hub();
        let mut a = connect(&hub, "conn-a", "a");
        let mut b = connect(&hub, "conn-b", "b");
        join(&hub, "conn-a");
        join(&hub, "conn-b");
        lock(&hub, "conn-a", "salary");
        drain(&mut a);
        drain(&mut b);

        hub.handle_disconnect("conn-a", "a");

        let b_msgs = drain(&mut b);
        assert_eq!(types(&b_msgs), vec!["userLeft"]);
        assert_eq!(b_msgs[0]["userId"], json!("a"));
        assert_eq!(b_msgs[0]["releasedLocks"].as_array().map(|l| l.len()), Some(1));
        assert!(hub.coordinator().get_field_locks("Employee", "42").is_empty());
        assert!(hub.connections().get("conn-a").is_none());
    }

    #[test]
    fn slow_connection_is_cut_off_and_still_cleaned_up() {
        let hub = hub();
        let mut a = connect_with_capacity(&hub, "conn-a", "a", 1);
        let mut b = connect(&hub, "conn-b", "b");

        // a never reads: its single slot holds "joined", so "fieldLocked" overflows
        join(&hub, "conn-a");
        lock(&hub, "conn-a", "salary");
        assert!(hub.connections().get("conn-a").is_none());
        assert_eq!(types(&drain(&mut a)), vec!["joined"]);
        assert!(matches!(a.try_recv(), Err(TryRecvError::Disconnected)));

        join(&hub, "conn-b");
        assert!(hub.connections().get("conn-b").is_some());
        assert_eq!(hub.coordinator().get_field_locks("Employee", "42").len(), 1);

        // The socket task ends and the guard reports the disconnect
        drain(&mut b);
        hub.handle_disconnect("conn-a", "a");

        let b_msgs = drain(&mut b);
        assert_eq!(types(&b_msgs), vec!["userLeft"]);
        assert_eq!(b_msgs[0]["releasedLocks"].as_array().map(|l| l.len()), Some(1));
        let online = hub.coordinator().get_online_users("Employee", "42");
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].user_id, "b");
    }

    #[test]
    fn stale_disconnect_leaves_newer_connection_alone() {
        let hub = hub();
        let _old = connect(&hub, "conn-old", "a");
        join(&hub, "conn-old");
        let mut new = connect(&hub, "conn-new", "a");
        join(&hub, "conn-new");
        drain(&mut new);

        hub.handle_disconnect("conn-old", "a");

        let online = hub.coordinator().get_online_users("Employee", "42");
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].connection_id, "conn-new");
        assert!(hub.connections().get("conn-new").is_some());
    }

    #[test]
    fn change_before_join_is_an_error_and_garbage_is_reported() {
        let hub = hub();
        let mut a = connect(&hub, "conn-a", "a");

        let msg = json!({
            "type": "fieldChange",
            "entityType": "Employee",
            "entityId": "1",
            "fieldName": "status",
            "newValue": 1,
        });
        send(&hub, "conn-a", msg);
        hub.handle_text("conn-a", "not json");
        send(&hub, "conn-a", json!({"type": "ping"}));

        assert_eq!(types(&drain(&mut a)), vec!["error", "error", "pong"]);
    }
}
