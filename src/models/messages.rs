use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collab::{
    ChangeType, CollaborationUser, ConflictInfo, FieldChange, FieldLock, UserStatus,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityMessage {
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldChangeMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
    #[serde(default)]
    pub change_type: ChangeType,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    pub is_typing: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub status: UserStatus,
}

/// Messages a client sends over the collaboration socket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "join")]
    Join(EntityMessage),
    #[serde(rename = "leave")]
    Leave(EntityMessage),
    #[serde(rename = "lockField")]
    LockField(FieldMessage),
    #[serde(rename = "unlockField")]
    UnlockField(FieldMessage),
    #[serde(rename = "fieldChange")]
    FieldChange(FieldChangeMessage),
    #[serde(rename = "typing")]
    Typing(TypingMessage),
    #[serde(rename = "status")]
    Status(StatusMessage),
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub user: CollaborationUser,
    pub online_users: Vec<CollaborationUser>,
    pub locks: Vec<FieldLock>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPresenceMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub user: CollaborationUser,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: String,
    pub released_locks: Vec<FieldLock>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldLockedMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub lock: FieldLock,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockRejectedMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    pub message: String,
    pub lock: Option<FieldLock>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldUnlockedMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldChangedMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub change: FieldChange,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictMessage {
    pub conflict: ConflictInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingBroadcastMessage {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    pub user_id: String,
    pub user_name: String,
    pub is_typing: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

/// Messages the server pushes to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "joined")]
    Joined(JoinedMessage),
    #[serde(rename = "userJoined")]
    UserJoined(UserPresenceMessage),
    #[serde(rename = "userLeft")]
    UserLeft(UserLeftMessage),
    #[serde(rename = "fieldLocked")]
    FieldLocked(FieldLockedMessage),
    #[serde(rename = "lockRejected")]
    LockRejected(LockRejectedMessage),
    #[serde(rename = "fieldUnlocked")]
    FieldUnlocked(FieldUnlockedMessage),
    #[serde(rename = "fieldChanged")]
    FieldChanged(FieldChangedMessage),
    #[serde(rename = "conflictDetected")]
    ConflictDetected(ConflictMessage),
    #[serde(rename = "typing")]
    Typing(TypingBroadcastMessage),
    #[serde(rename = "statusChanged")]
    StatusChanged(UserPresenceMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}
