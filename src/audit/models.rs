//! Audit log entry types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Assigned,
    Commented,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::Assigned => "assigned",
            AuditAction::Commented => "commented",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Ticket,
    User,
    Comment,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Ticket => "ticket",
            ResourceType::User => "user",
            ResourceType::Comment => "comment",
        }
    }
}

/// One immutable audit record. Entries are appended on every mutation and
/// never edited or deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub user_id: Uuid,
    pub customer_id: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub created_at: String,
}

/// What to record; the store fills in id and timestamp.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub user_id: Uuid,
    pub customer_id: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Query string of the audit listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub resource_type: Option<ResourceType>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(serde_json::to_string(&AuditAction::Commented).unwrap(), r#""commented""#);
        let action: AuditAction = serde_json::from_str(r#""assigned""#).unwrap();
        assert_eq!(action, AuditAction::Assigned);
        assert!(serde_json::from_str::<AuditAction>(r#""archived""#).is_err());
    }
}
