// service/payment_service.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        consultationmodel::Consultation,
        escrowmodel::Escrow,
        paymentmodel::{NewPaymentAccount, PaymentAccount, PaymentPurpose},
    },
    service::{
        audit_service::{actions, AuditService},
        consultation_service::ConsultationService,
        error::ServiceError,
        escrow_service::EscrowService,
        payment_provider::{verify_webhook_signature, PaymentGateway},
    },
};

/// What a confirmed charge ended up paying for.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "purpose", content = "record", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Consultation(Consultation),
    MilestoneEscrow(Escrow),
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: Option<String>,
}

/// Routes gateway confirmations (callback and webhook) to the escrow or
/// consultation flow, and manages payout accounts.
pub struct PaymentService {
    db: Arc<dyn MarketStore>,
    gateway: Arc<dyn PaymentGateway>,
    escrow: Arc<EscrowService>,
    consultations: Arc<ConsultationService>,
    audit: Arc<AuditService>,
    webhook_secret: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<dyn MarketStore>,
        gateway: Arc<dyn PaymentGateway>,
        escrow: Arc<EscrowService>,
        consultations: Arc<ConsultationService>,
        audit: Arc<AuditService>,
        webhook_secret: String,
    ) -> Self {
        Self { db, gateway, escrow, consultations, audit, webhook_secret }
    }

    /// Settles a payment reference. Callback and webhook both land here, in
    /// any order and any number of times.
    pub async fn finalize(&self, reference: &str) -> Result<PaymentOutcome, ServiceError> {
        if let Some(escrow) = self.db.get_escrow_by_payment_reference(reference).await? {
            return Ok(PaymentOutcome::MilestoneEscrow(escrow));
        }
        if let Some(consultation) = self.db.get_consultation_by_reference(reference).await? {
            if consultation.paid_at.is_some() {
                return Ok(PaymentOutcome::Consultation(consultation));
            }
        }

        let verification = self.gateway.verify_payment(reference).await.map_err(|e| {
            tracing::error!("Failed to verify payment {}: {}", reference, e);
            e
        })?;

        match PaymentPurpose::from_metadata(&verification.metadata) {
            Some(PaymentPurpose::MilestoneEscrow) => Ok(PaymentOutcome::MilestoneEscrow(
                self.escrow.apply_verified_funding(&verification).await?,
            )),
            Some(PaymentPurpose::Consultation) => Ok(PaymentOutcome::Consultation(
                self.consultations.apply_verified_payment(&verification).await?,
            )),
            None => {
                tracing::warn!("Payment {} carries no known purpose: {}", reference, verification.metadata);
                Err(ServiceError::Validation(format!(
                    "Payment {} has no recognised purpose",
                    reference
                )))
            }
        }
    }

    /// Verifies the signature over the raw body before reading it. Events
    /// other than `charge.success` are acknowledged and ignored.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<Option<PaymentOutcome>, ServiceError> {
        verify_webhook_signature(payload, signature, &self.webhook_secret).map_err(|e| {
            tracing::warn!("Rejected webhook: {}", e);
            e
        })?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::Validation(format!("Malformed webhook body: {}", e)))?;

        if event.event != "charge.success" {
            tracing::info!("Ignoring {} webhook event", event.event);
            return Ok(None);
        }

        let reference = event
            .data
            .reference
            .ok_or_else(|| ServiceError::Validation("charge.success without a reference".to_string()))?;

        tracing::info!("Webhook charge.success for {}", reference);
        self.finalize(&reference).await.map(Some)
    }

    pub async fn add_payment_account(
        &self,
        account: NewPaymentAccount,
        make_default: bool,
    ) -> Result<PaymentAccount, ServiceError> {
        if account.account_number.len() != 10 || !account.account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ServiceError::Validation("Account number must be 10 digits".to_string()));
        }
        if account.bank_code.trim().is_empty() || account.account_name.trim().is_empty() {
            return Err(ServiceError::Validation("Bank code and account name are required".to_string()));
        }

        let user_id = account.user_id;
        let created = self.db.add_payment_account(account, make_default).await?;

        tracing::info!("Payment account {} added for user {}", created.id, user_id);
        self.audit
            .log_payment_account(user_id, &created, actions::PAYMENT_ACCOUNT_ADDED)
            .await;
        Ok(created)
    }

    pub async fn set_default_payment_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<PaymentAccount, ServiceError> {
        let account = self
            .db
            .set_default_payment_account(user_id, account_id)
            .await?
            .ok_or(ServiceError::PaymentAccountNotFound(account_id))?;

        self.audit
            .log_payment_account(user_id, &account, actions::PAYMENT_ACCOUNT_DEFAULT_SET)
            .await;
        Ok(account)
    }

    pub async fn get_payment_accounts(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>, ServiceError> {
        Ok(self.db.get_payment_accounts(user_id).await?)
    }
}
