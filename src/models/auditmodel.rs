use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub project_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub escrow_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub project_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub escrow_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub template: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
