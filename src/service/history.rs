// service/history.rs
use std::{str::FromStr, sync::Arc};

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        auditmodel::AuditLog,
        paymentmodel::{HistoryEntryKind, TransactionHistoryEntry},
    },
    service::{audit_service::actions, error::ServiceError},
};

/// Per-user money movement, projected from escrow audit entries.
pub struct HistoryService {
    db: Arc<dyn MarketStore>,
}

impl HistoryService {
    pub fn new(db: Arc<dyn MarketStore>) -> Self {
        Self { db }
    }

    pub async fn get_transaction_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TransactionHistoryEntry>, ServiceError> {
        let logs = self.db.get_escrow_audit_for_party(user_id).await?;

        let mut entries: Vec<TransactionHistoryEntry> = logs
            .iter()
            .filter_map(|log| project_entry(log, user_id))
            .collect();
        entries.sort_by_key(|e| e.occurred_at);
        Ok(entries)
    }
}

fn detail_uuid(log: &AuditLog, key: &str) -> Option<Uuid> {
    log.details
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn detail_amount(log: &AuditLog, key: &str) -> Option<BigDecimal> {
    log.details
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| BigDecimal::from_str(s).ok())
}

fn project_entry(log: &AuditLog, user_id: Uuid) -> Option<TransactionHistoryEntry> {
    let escrow_id = log.escrow_id?;
    let client_id = detail_uuid(log, "client_id");
    let company_id = detail_uuid(log, "company_id");

    let is_client = client_id == Some(user_id);
    if !is_client && company_id != Some(user_id) {
        return None;
    }

    let (kind, amount_key) = match (log.action.as_str(), is_client) {
        (actions::ESCROW_FUNDED, _) => (HistoryEntryKind::EscrowFunded, "amount"),
        (actions::ESCROW_RELEASED, true) => (HistoryEntryKind::PaymentReleased, "amount"),
        (actions::ESCROW_RELEASED, false) => (HistoryEntryKind::PayoutReceived, "net_amount"),
        (actions::ESCROW_REFUNDED, true) => (HistoryEntryKind::RefundReceived, "amount"),
        (actions::ESCROW_REFUNDED, false) => (HistoryEntryKind::EscrowRefunded, "amount"),
        _ => return None,
    };

    let Some(amount) = detail_amount(log, amount_key) else {
        tracing::warn!("Audit entry {} has no readable {}", log.id, amount_key);
        return None;
    };

    Some(TransactionHistoryEntry {
        kind,
        escrow_id,
        project_id: log.project_id,
        milestone_id: log.milestone_id,
        amount,
        counterparty_id: if is_client { company_id } else { client_id },
        hold_ref: log
            .details
            .get("hold_ref")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        occurred_at: log.created_at,
    })
}
