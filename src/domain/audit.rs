use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// Append-only record of a financial state transition or security event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn new(
        entity_type: &str,
        entity_id: &str,
        action: &str,
        actor: &str,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            detail,
            created_at: Utc::now(),
        }
    }
}
