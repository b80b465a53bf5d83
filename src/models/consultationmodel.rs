use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use bigdecimal::BigDecimal;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "consultation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    PendingPayment,
    Scheduled,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            ConsultationStatus::PendingPayment => "pending_payment",
            ConsultationStatus::Scheduled => "scheduled",
            ConsultationStatus::Completed => "completed",
            ConsultationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Consultation {
    pub id: Uuid,
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub fee: BigDecimal,
    pub topic: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub status: ConsultationStatus,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConsultation {
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub fee: BigDecimal,
    pub topic: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub payment_reference: String,
}

#[derive(Debug, Clone)]
pub enum ConsultationPayment {
    Confirmed(Consultation),
    AlreadyConfirmed(Consultation),
}

impl ConsultationPayment {
    pub fn into_inner(self) -> Consultation {
        match self {
            ConsultationPayment::Confirmed(c) | ConsultationPayment::AlreadyConfirmed(c) => c,
        }
    }
}
