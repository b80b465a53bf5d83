// db/consultationdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::{status_list, DBClient};
use crate::models::consultationmodel::*;

const CONSULTATION_COLUMNS: &str = "id, client_id, company_id, fee, topic, scheduled_for, status, \
    payment_reference, paid_at, created_at";

#[async_trait]
pub trait ConsultationExt {
    async fn create_consultation(&self, consultation: NewConsultation) -> Result<Consultation, Error>;

    async fn get_consultation(&self, consultation_id: Uuid) -> Result<Option<Consultation>, Error>;

    async fn get_consultation_by_reference(&self, reference: &str) -> Result<Option<Consultation>, Error>;

    /// pending_payment -> scheduled, keyed on the payment reference. A repeat
    /// for an already paid reference returns `AlreadyConfirmed`.
    async fn confirm_consultation_payment(&self, reference: &str) -> Result<Option<ConsultationPayment>, Error>;

    async fn update_consultation_status(
        &self,
        consultation_id: Uuid,
        expected: &[ConsultationStatus],
        to: ConsultationStatus,
    ) -> Result<Option<Consultation>, Error>;
}

#[async_trait]
impl ConsultationExt for DBClient {
    async fn create_consultation(&self, consultation: NewConsultation) -> Result<Consultation, Error> {
        sqlx::query_as::<_, Consultation>(&format!(
            r#"
            INSERT INTO consultations
            (client_id, company_id, fee, topic, scheduled_for, payment_reference)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CONSULTATION_COLUMNS}
            "#
        ))
        .bind(consultation.client_id)
        .bind(consultation.company_id)
        .bind(consultation.fee)
        .bind(consultation.topic)
        .bind(consultation.scheduled_for)
        .bind(consultation.payment_reference)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_consultation(&self, consultation_id: Uuid) -> Result<Option<Consultation>, Error> {
        sqlx::query_as::<_, Consultation>(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = $1"
        ))
        .bind(consultation_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_consultation_by_reference(&self, reference: &str) -> Result<Option<Consultation>, Error> {
        sqlx::query_as::<_, Consultation>(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
    }

    async fn confirm_consultation_payment(&self, reference: &str) -> Result<Option<ConsultationPayment>, Error> {
        let confirmed = sqlx::query_as::<_, Consultation>(&format!(
            r#"
            UPDATE consultations SET status = 'scheduled', paid_at = NOW()
            WHERE payment_reference = $1 AND status = 'pending_payment'
            RETURNING {CONSULTATION_COLUMNS}
            "#
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(consultation) = confirmed {
            return Ok(Some(ConsultationPayment::Confirmed(consultation)));
        }

        Ok(self
            .get_consultation_by_reference(reference)
            .await?
            .filter(|c| c.paid_at.is_some())
            .map(ConsultationPayment::AlreadyConfirmed))
    }

    async fn update_consultation_status(
        &self,
        consultation_id: Uuid,
        expected: &[ConsultationStatus],
        to: ConsultationStatus,
    ) -> Result<Option<Consultation>, Error> {
        sqlx::query_as::<_, Consultation>(&format!(
            r#"
            UPDATE consultations SET status = $2
            WHERE id = $1 AND status::text = ANY($3)
            RETURNING {CONSULTATION_COLUMNS}
            "#
        ))
        .bind(consultation_id)
        .bind(to)
        .bind(status_list(expected, ConsultationStatus::to_str))
        .fetch_optional(&self.pool)
        .await
    }
}
