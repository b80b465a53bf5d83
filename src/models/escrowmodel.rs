use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use bigdecimal::BigDecimal;

use super::projectmodel::Milestone;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "escrow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
}

impl EscrowStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Escrow {
    pub id: Uuid,
    pub milestone_id: Uuid,
    pub project_id: Uuid,
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub amount: BigDecimal,
    pub platform_fee: BigDecimal,
    pub net_amount: BigDecimal,
    pub payment_reference: String,
    pub payment_provider: String,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EscrowHoldReference {
    pub id: Uuid,
    pub hold_ref: String,
    pub escrow_id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Uuid,
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub gateway_charge_reference: String,
    pub gateway_transfer_reference: Option<String>,
    pub gateway_refund_reference: Option<String>,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEscrow {
    pub milestone_id: Uuid,
    pub project_id: Uuid,
    pub client_id: Uuid,
    pub company_id: Uuid,
    pub amount: BigDecimal,
    pub platform_fee: BigDecimal,
    pub net_amount: BigDecimal,
    pub payment_reference: String,
    pub payment_provider: String,
}

/// Outcome of recording a confirmed funding payment.
#[derive(Debug, Clone)]
pub enum FundingRecord {
    Created {
        escrow: Escrow,
        hold_reference: EscrowHoldReference,
        milestone: Milestone,
    },
    /// The payment reference was already recorded by an earlier confirmation.
    AlreadyRecorded(Escrow),
    /// The milestone no longer satisfied the funding guards at write time.
    Stale,
    /// Another escrow committed the same hold reference first. Nothing was written.
    HoldRefTaken,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettledEscrow {
    pub escrow: Escrow,
    pub hold_reference: Option<EscrowHoldReference>,
    pub milestone: Milestone,
}
