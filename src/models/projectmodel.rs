use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use bigdecimal::BigDecimal;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Completed,
    Disputed,
    Cancelled,
}

impl ProjectStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Disputed => "disputed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "milestone_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Funded,
    Submitted,
    Approved,
    Rejected,
    Released,
}

impl MilestoneStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Funded => "funded",
            MilestoneStatus::Submitted => "submitted",
            MilestoneStatus::Approved => "approved",
            MilestoneStatus::Rejected => "rejected",
            MilestoneStatus::Released => "released",
        }
    }

    /// A milestone whose successor may be funded.
    pub fn is_complete(&self) -> bool {
        matches!(self, MilestoneStatus::Approved | MilestoneStatus::Released)
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub budget_min: BigDecimal,
    pub budget_max: BigDecimal,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.company_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Milestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub sequence_order: i32,
    pub status: MilestoneStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub client_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MilestoneEvidence {
    pub id: Uuid,
    pub milestone_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: String,
    pub bytes: i64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub budget_min: BigDecimal,
    pub budget_max: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub sequence_order: i32,
}

/// Result of a blob-store upload attached to a milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: String,
    pub bytes: i64,
}

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub milestone_id: Uuid,
    pub uploaded_by: Uuid,
    pub file: UploadedFile,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MilestoneVerification {
    pub milestone: Milestone,
    pub project: Project,
    pub project_activated: bool,
}
