use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::{
        consultationmodel::ConsultationStatus, disputemodel::DisputeStatus,
        escrowmodel::EscrowStatus, projectmodel::{MilestoneStatus, ProjectStatus},
    },
    service::payment_provider::PaymentProviderError,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("Milestone {0} not found")]
    MilestoneNotFound(Uuid),

    #[error("Escrow for {0} not found")]
    EscrowNotFound(Uuid),

    #[error("Dispute {0} not found")]
    DisputeNotFound(Uuid),

    #[error("Consultation {0} not found")]
    ConsultationNotFound(Uuid),

    #[error("Payment account {0} not found")]
    PaymentAccountNotFound(Uuid),

    #[error("No pending payment found for reference {0}")]
    PaymentReferenceNotFound(String),

    #[error("User {0} is not a party to project {1}")]
    NotProjectParty(Uuid, Uuid),

    #[error("User {0} is not a party to consultation {1}")]
    NotConsultationParty(Uuid, Uuid),

    #[error("Cannot {action} milestone {milestone_id} while it is {status}")]
    InvalidMilestoneTransition {
        milestone_id: Uuid,
        action: &'static str,
        status: MilestoneStatus,
    },

    #[error("Previous milestone {previous_id} must be completed before funding milestone {milestone_id}")]
    PreviousMilestoneIncomplete { milestone_id: Uuid, previous_id: Uuid },

    #[error("Project {0} has an open dispute; funding and approval are suspended until it is resolved")]
    ActiveDispute(Uuid),

    #[error("Milestone {0} has no evidence; upload at least one file first")]
    MissingEvidence(Uuid),

    #[error("Milestone {0} already has an escrow")]
    EscrowAlreadyExists(Uuid),

    #[error("Escrow {escrow_id} is {status}, only held escrows can move funds")]
    EscrowNotHeld { escrow_id: Uuid, status: EscrowStatus },

    #[error("Project {project_id} is {status}; this action requires {required}")]
    InvalidProjectStatus {
        project_id: Uuid,
        status: ProjectStatus,
        required: &'static str,
    },

    #[error("Dispute {0} is {1}; only open disputes can be closed")]
    InvalidDisputeStatus(Uuid, DisputeStatus),

    #[error("Consultation {0} is {1}")]
    InvalidConsultationStatus(Uuid, ConsultationStatus),

    #[error("User {0} has no payout account; add a bank account before release")]
    NoPayoutAccount(Uuid),

    #[error("Paid amount {paid} is less than the expected {expected} for reference {reference}")]
    AmountMismatch {
        reference: String,
        expected: BigDecimal,
        paid: BigDecimal,
    },

    #[error("{entity} {id} was modified concurrently, reload and retry")]
    ConcurrentModification { entity: &'static str, id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(#[from] PaymentProviderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ProjectNotFound(_)
            | ServiceError::MilestoneNotFound(_)
            | ServiceError::EscrowNotFound(_)
            | ServiceError::DisputeNotFound(_)
            | ServiceError::ConsultationNotFound(_)
            | ServiceError::PaymentAccountNotFound(_)
            | ServiceError::PaymentReferenceNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::NotProjectParty(_, _) | ServiceError::NotConsultationParty(_, _) => {
                StatusCode::FORBIDDEN
            }

            ServiceError::InvalidMilestoneTransition { .. }
            | ServiceError::PreviousMilestoneIncomplete { .. }
            | ServiceError::ActiveDispute(_)
            | ServiceError::EscrowAlreadyExists(_)
            | ServiceError::EscrowNotHeld { .. }
            | ServiceError::InvalidProjectStatus { .. }
            | ServiceError::InvalidDisputeStatus(_, _)
            | ServiceError::InvalidConsultationStatus(_, _)
            | ServiceError::ConcurrentModification { .. } => StatusCode::CONFLICT,

            ServiceError::MissingEvidence(_)
            | ServiceError::NoPayoutAccount(_)
            | ServiceError::AmountMismatch { .. }
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::PaymentProvider(PaymentProviderError::SignatureMismatch) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::PaymentProvider(PaymentProviderError::InvalidAmount(_)) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,

            ServiceError::Database(_) | ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Service error: {}", error);
            return HttpError::new(ErrorMessage::ServerError.to_string(), status);
        }
        if status.is_server_error() {
            tracing::error!("Service error: {}", error);
        }
        HttpError::new(error.to_string(), status)
    }
}
