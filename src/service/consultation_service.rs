// service/consultation_service.rs
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{consultationmodel::*, paymentmodel::PaymentPurpose},
    service::{
        audit_service::AuditService,
        error::ServiceError,
        escrow_service::EscrowSettings,
        notification_service::NotificationService,
        payment_provider::{ChargeStatus, PaymentGateway, PaymentProviderError, PaymentVerification},
    },
    utils::currency::is_positive,
};

#[derive(Debug, Clone, Serialize)]
pub struct ConsultationBooking {
    pub consultation: Consultation,
    pub authorization_url: String,
    pub access_code: String,
}

pub struct ConsultationService {
    db: Arc<dyn MarketStore>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
    settings: EscrowSettings,
}

impl ConsultationService {
    pub fn new(
        db: Arc<dyn MarketStore>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
        settings: EscrowSettings,
    ) -> Self {
        Self { db, gateway, audit, notifications, settings }
    }

    pub async fn get_consultation(&self, consultation_id: Uuid) -> Result<Consultation, ServiceError> {
        self.db
            .get_consultation(consultation_id)
            .await?
            .ok_or(ServiceError::ConsultationNotFound(consultation_id))
    }

    /// Opens the fee charge first; the consultation row only exists once the
    /// gateway has accepted the charge.
    pub async fn book(
        &self,
        client_id: Uuid,
        company_id: Uuid,
        fee: BigDecimal,
        topic: String,
        scheduled_for: Option<DateTime<Utc>>,
        email: &str,
    ) -> Result<ConsultationBooking, ServiceError> {
        if !is_positive(&fee) {
            return Err(ServiceError::Validation("Consultation fee must be positive".to_string()));
        }
        if client_id == company_id {
            return Err(ServiceError::Validation("A consultation needs two different parties".to_string()));
        }

        let reference = format!("CNS-{}", Uuid::new_v4().simple());
        let metadata = serde_json::json!({
            "type": PaymentPurpose::Consultation.to_str(),
            "client_id": client_id,
            "company_id": company_id,
        });

        let init = self
            .gateway
            .initialize_payment(&fee, &self.settings.currency, email, &reference, metadata)
            .await?;

        let consultation = self
            .db
            .create_consultation(NewConsultation {
                client_id,
                company_id,
                fee,
                topic,
                scheduled_for,
                payment_reference: init.reference,
            })
            .await?;

        tracing::info!("Consultation {} booked, awaiting payment", consultation.id);
        Ok(ConsultationBooking {
            consultation,
            authorization_url: init.authorization_url,
            access_code: init.access_code,
        })
    }

    /// pending_payment -> scheduled for a verified charge. Repeats return the
    /// already scheduled consultation.
    pub async fn apply_verified_payment(
        &self,
        verification: &PaymentVerification,
    ) -> Result<Consultation, ServiceError> {
        let reference = verification.reference.as_str();
        let consultation = self
            .db
            .get_consultation_by_reference(reference)
            .await?
            .ok_or_else(|| ServiceError::PaymentReferenceNotFound(reference.to_string()))?;

        if consultation.paid_at.is_some() {
            return Ok(consultation);
        }
        if verification.status != ChargeStatus::Success {
            return Err(PaymentProviderError::NotSuccessful {
                reference: reference.to_string(),
                status: format!("{:?}", verification.status).to_lowercase(),
            }
            .into());
        }
        if verification.amount < consultation.fee {
            return Err(ServiceError::AmountMismatch {
                reference: reference.to_string(),
                expected: consultation.fee.clone(),
                paid: verification.amount.clone(),
            });
        }

        match self.db.confirm_consultation_payment(reference).await? {
            Some(ConsultationPayment::Confirmed(paid)) => {
                tracing::info!("Consultation {} paid and scheduled", paid.id);
                self.audit.log_consultation_paid(&paid).await;
                self.notifications.notify_consultation_scheduled(&paid);
                Ok(paid)
            }
            Some(ConsultationPayment::AlreadyConfirmed(paid)) => Ok(paid),
            None => {
                tracing::error!(
                    "Payment {} captured for consultation {} in status {}",
                    reference,
                    consultation.id,
                    consultation.status
                );
                Err(ServiceError::InvalidConsultationStatus(consultation.id, consultation.status))
            }
        }
    }

    pub async fn complete(&self, consultation_id: Uuid, actor_id: Uuid) -> Result<Consultation, ServiceError> {
        self.move_status(
            consultation_id,
            actor_id,
            &[ConsultationStatus::Scheduled],
            ConsultationStatus::Completed,
        )
        .await
    }

    /// Only unpaid bookings can be cancelled here; paid ones go through support.
    pub async fn cancel(&self, consultation_id: Uuid, actor_id: Uuid) -> Result<Consultation, ServiceError> {
        self.move_status(
            consultation_id,
            actor_id,
            &[ConsultationStatus::PendingPayment],
            ConsultationStatus::Cancelled,
        )
        .await
    }

    async fn move_status(
        &self,
        consultation_id: Uuid,
        actor_id: Uuid,
        expected: &[ConsultationStatus],
        to: ConsultationStatus,
    ) -> Result<Consultation, ServiceError> {
        let consultation = self.get_consultation(consultation_id).await?;
        if consultation.client_id != actor_id && consultation.company_id != actor_id {
            return Err(ServiceError::NotConsultationParty(actor_id, consultation_id));
        }

        let updated = match self.db.update_consultation_status(consultation_id, expected, to).await? {
            Some(c) => c,
            None => {
                let current = self.get_consultation(consultation_id).await?;
                return Err(ServiceError::InvalidConsultationStatus(consultation_id, current.status));
            }
        };

        tracing::info!("Consultation {} is now {}", consultation_id, updated.status);
        self.audit.log_consultation_status(actor_id, &updated).await;
        Ok(updated)
    }
}
