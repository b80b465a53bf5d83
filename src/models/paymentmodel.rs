use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use bigdecimal::BigDecimal;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentAccount {
    pub user_id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

/// What the payment metadata says a charge was for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    Consultation,
    MilestoneEscrow,
}

impl PaymentPurpose {
    pub fn to_str(&self) -> &'static str {
        match self {
            PaymentPurpose::Consultation => "consultation",
            PaymentPurpose::MilestoneEscrow => "milestone_escrow",
        }
    }

    pub fn from_metadata(metadata: &serde_json::Value) -> Option<Self> {
        match metadata.get("type").and_then(|v| v.as_str()) {
            Some("consultation") => Some(PaymentPurpose::Consultation),
            Some("milestone_escrow") => Some(PaymentPurpose::MilestoneEscrow),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEntryKind {
    EscrowFunded,
    PaymentReleased,
    PayoutReceived,
    RefundReceived,
    EscrowRefunded,
}

/// One row of a party's transaction history, derived from the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionHistoryEntry {
    pub kind: HistoryEntryKind,
    pub escrow_id: Uuid,
    pub project_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub counterparty_id: Option<Uuid>,
    pub hold_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
