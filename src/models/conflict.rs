use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::collab::ConflictStatus;

/// Request body for recording a conflict resolution
#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub status: ConflictStatus,
    pub resolved_by: String,
    #[schema(value_type = Option<Object>)]
    #[serde(default)]
    pub resolved_value: Option<Value>,
}
