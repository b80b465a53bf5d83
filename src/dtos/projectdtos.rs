// dtos/projectdtos.rs
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    disputemodel::{Dispute, DisputeStatus},
    escrowmodel::{Escrow, EscrowHoldReference},
    projectmodel::*,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

// Project DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateProjectDto {
    pub consultation_id: Uuid,

    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    pub budget_min: BigDecimal,
    pub budget_max: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailDto {
    pub project: Project,
    pub milestones: Vec<Milestone>,
    pub disputes: Vec<Dispute>,
}

// Milestone DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct MilestoneInputDto {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    pub amount: BigDecimal,

    #[validate(range(min = 1, message = "Sequence order starts at 1"))]
    pub sequence_order: i32,
}

impl From<MilestoneInputDto> for NewMilestone {
    fn from(dto: MilestoneInputDto) -> Self {
        NewMilestone {
            title: dto.title,
            description: dto.description,
            amount: dto.amount,
            sequence_order: dto.sequence_order,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateMilestonesDto {
    #[validate(length(min = 1, message = "At least one milestone is required"))]
    pub milestones: Vec<MilestoneInputDto>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct VerifyMilestoneDto {
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddEvidenceDto {
    #[validate(url(message = "Invalid file URL"))]
    pub url: String,

    #[validate(url(message = "Invalid thumbnail URL"))]
    pub thumbnail_url: Option<String>,

    pub width: Option<i32>,
    pub height: Option<i32>,

    #[validate(length(min = 1, message = "Format is required"))]
    pub format: String,

    #[validate(range(min = 1, message = "Uploaded file is empty"))]
    pub bytes: i64,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

impl AddEvidenceDto {
    pub fn into_parts(self) -> (UploadedFile, Option<String>) {
        (
            UploadedFile {
                url: self.url,
                thumbnail_url: self.thumbnail_url,
                width: self.width,
                height: self.height,
                format: self.format,
                bytes: self.bytes,
            },
            self.description,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RejectMilestoneDto {
    #[validate(length(min = 3, max = 1000, message = "Reason must be between 3 and 1000 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct MilestoneDetailDto {
    pub milestone: Milestone,
    pub evidence: Vec<MilestoneEvidence>,
    pub escrow: Option<Escrow>,
    pub hold_reference: Option<EscrowHoldReference>,
}

#[derive(Debug, Serialize)]
pub struct RejectionResponseDto {
    pub milestone: Milestone,
    pub revision_request: Dispute,
}

// Escrow DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct FundMilestoneDto {
    #[validate(email(message = "A valid payer email is required"))]
    pub email: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReleaseEscrowDto {
    #[serde(default)]
    pub admin_override: bool,
    pub payment_account_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefundEscrowDto {
    #[validate(length(min = 3, max = 500, message = "Reason must be between 3 and 500 characters"))]
    pub reason: String,
}

// Dispute DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RaiseDisputeDto {
    pub milestone_id: Option<Uuid>,

    #[validate(length(min = 10, max = 2000, message = "Reason must be between 10 and 2000 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResolveDisputeDto {
    pub outcome: DisputeStatus,

    #[validate(length(min = 3, max = 2000, message = "Resolution must be between 3 and 2000 characters"))]
    pub resolution: String,
}
