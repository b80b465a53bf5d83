use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "dispute_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    RevisionRequest,
    Dispute,
}

impl DisputeType {
    pub fn to_str(&self) -> &'static str {
        match self {
            DisputeType::RevisionRequest => "revision_request",
            DisputeType::Dispute => "dispute",
        }
    }
}

impl std::fmt::Display for DisputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "dispute_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
    Escalated,
}

impl DisputeStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub dispute_type: DisputeType,
    pub raised_by: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Only open full disputes halt money movement on the project.
    pub fn blocks_money_movement(&self) -> bool {
        self.dispute_type == DisputeType::Dispute && self.status == DisputeStatus::Open
    }
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub dispute_type: DisputeType,
    pub raised_by: Uuid,
    pub reason: String,
}
