use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifies the record being edited. Both parts are opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub entity_type: String,
    pub entity_id: String,
}

impl SessionKey {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.entity_type.is_empty() && !self.entity_id.is_empty()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum UserStatus {
    #[default]
    Online,
    Away,
    Busy,
    Offline,
}

/// A participant of a session, bound to one live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationUser {
    pub user_id: String,
    pub user_name: String,
    pub connection_id: String,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: UserStatus,
    /// Field name -> last time a typing event was seen for it.
    pub typing_fields: HashMap<String, DateTime<Utc>>,
}

impl CollaborationUser {
    pub fn new(user_id: &str, user_name: &str, connection_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            connection_id: connection_id.to_string(),
            joined_at: now,
            last_activity: now,
            status: UserStatus::Online,
            typing_fields: HashMap::new(),
        }
    }
}

/// Advisory, time-bounded claim on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldLock {
    pub field_name: String,
    pub user_id: String,
    pub user_name: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum ChangeType {
    Create,
    #[default]
    Update,
    Delete,
    Lock,
    Unlock,
}

/// One edit of one field. `timestamp` and `version` are stamped by the session
/// when the change is processed; whatever the caller put there is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field_name: String,
    #[schema(value_type = Option<Object>)]
    pub old_value: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub new_value: Option<Value>,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub change_type: ChangeType,
}

impl FieldChange {
    pub fn new(
        field_name: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        user_id: &str,
        user_name: &str,
        change_type: ChangeType,
    ) -> Self {
        Self {
            field_name: field_name.to_string(),
            old_value,
            new_value,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            timestamp: DateTime::<Utc>::default(),
            version: 0,
            change_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictingChange {
    pub user_id: String,
    pub user_name: String,
    #[schema(value_type = Option<Object>)]
    pub value: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
}

impl From<&FieldChange> for ConflictingChange {
    fn from(change: &FieldChange) -> Self {
        Self {
            user_id: change.user_id.clone(),
            user_name: change.user_name.clone(),
            value: change.new_value.clone(),
            timestamp: change.timestamp,
            version: change.version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum ConflictStatus {
    #[default]
    Pending,
    Resolved,
    Ignored,
    AutoResolved,
}

/// A group of near-simultaneous changes to one field by different users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub conflict_id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    /// The incoming change first, then the matched earlier changes, newest first.
    pub conflicting_changes: Vec<ConflictingChange>,
    pub detected_at: DateTime<Utc>,
    pub status: ConflictStatus,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    pub resolved_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LockResult {
    pub success: bool,
    pub message: String,
    /// The caller's lock on success, the holder's lock on rejection.
    pub lock: Option<FieldLock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProcessResult {
    pub success: bool,
    pub has_conflict: bool,
    pub conflict: Option<ConflictInfo>,
    pub processed_change: Option<FieldChange>,
}

impl ChangeProcessResult {
    pub fn rejected() -> Self {
        Self {
            success: false,
            has_conflict: false,
            conflict: None,
            processed_change: None,
        }
    }
}

/// What a leave (explicit or via disconnect) did to one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResult {
    pub left: bool,
    pub released_locks: Vec<FieldLock>,
    pub session_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: String,
    pub user_name: String,
    pub field_name: String,
    pub since: DateTime<Utc>,
}

/// Counts of what one sweep evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub participants_evicted: usize,
    pub locks_evicted: usize,
    pub typing_flags_cleared: usize,
    pub sessions_removed: usize,
    pub index_entries_pruned: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
