// db/escrowdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{escrowmodel::*, projectmodel::Milestone};

const ESCROW_COLUMNS: &str = "id, milestone_id, project_id, client_id, company_id, amount, \
    platform_fee, net_amount, payment_reference, payment_provider, status, created_at, \
    released_at, refunded_at";

const HOLD_REFERENCE_COLUMNS: &str = "id, hold_ref, escrow_id, project_id, milestone_id, \
    client_id, company_id, gateway_charge_reference, gateway_transfer_reference, \
    gateway_refund_reference, status, created_at, updated_at";

const MILESTONE_COLUMNS: &str = "id, project_id, title, description, amount, sequence_order, \
    status, verified_at, verified_by, client_notes, created_at, updated_at";

#[async_trait]
pub trait EscrowExt {
    async fn get_escrow_by_milestone(&self, milestone_id: Uuid) -> Result<Option<Escrow>, Error>;

    async fn get_escrow_by_payment_reference(&self, reference: &str) -> Result<Option<Escrow>, Error>;

    async fn get_hold_reference(&self, escrow_id: Uuid) -> Result<Option<EscrowHoldReference>, Error>;

    async fn hold_reference_exists(&self, hold_ref: &str) -> Result<bool, Error>;

    /// Creates the held escrow, its hold reference and moves the milestone to
    /// `funded` in one unit. The milestone write re-checks the funding guards
    /// (pending, predecessor complete, no open full dispute).
    async fn record_funded_escrow(
        &self,
        escrow: NewEscrow,
        hold_ref: String,
    ) -> Result<FundingRecord, Error>;

    /// held -> released together with the milestone. `None` when either
    /// compare-and-set lost.
    async fn release_escrow(
        &self,
        escrow_id: Uuid,
        admin_override: bool,
        transfer_reference: String,
    ) -> Result<Option<SettledEscrow>, Error>;

    /// held -> refunded. The milestone status is left untouched.
    async fn refund_escrow(
        &self,
        escrow_id: Uuid,
        refund_reference: String,
    ) -> Result<Option<SettledEscrow>, Error>;
}

#[async_trait]
impl EscrowExt for DBClient {
    async fn get_escrow_by_milestone(&self, milestone_id: Uuid) -> Result<Option<Escrow>, Error> {
        sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrows WHERE milestone_id = $1"
        ))
        .bind(milestone_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_escrow_by_payment_reference(&self, reference: &str) -> Result<Option<Escrow>, Error> {
        sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrows WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_hold_reference(&self, escrow_id: Uuid) -> Result<Option<EscrowHoldReference>, Error> {
        sqlx::query_as::<_, EscrowHoldReference>(&format!(
            "SELECT {HOLD_REFERENCE_COLUMNS} FROM escrow_hold_references WHERE escrow_id = $1"
        ))
        .bind(escrow_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn hold_reference_exists(&self, hold_ref: &str) -> Result<bool, Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM escrow_hold_references WHERE hold_ref = $1)")
            .bind(hold_ref)
            .fetch_one(&self.pool)
            .await
    }

    async fn record_funded_escrow(
        &self,
        escrow: NewEscrow,
        hold_ref: String,
    ) -> Result<FundingRecord, Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrows WHERE payment_reference = $1"
        ))
        .bind(&escrow.payment_reference)
        .fetch_optional(&mut *tx)
        .await?
        {
            return Ok(FundingRecord::AlreadyRecorded(existing));
        }

        // Same guards as `milestone_machine::ensure_fundable`, mirrored by
        // `MemoryStore::record_funded_escrow`. Predecessor is the closest lower
        // sequence order in the same project. A `funded` milestone without an
        // escrow was only marked ready by the company.
        let milestone = sqlx::query_as::<_, Milestone>(&format!(
            r#"
            UPDATE milestones m SET status = 'funded', updated_at = NOW()
            WHERE m.id = $1
              AND m.status IN ('pending', 'funded')
              AND NOT EXISTS (
                  SELECT 1 FROM disputes d
                  WHERE d.project_id = m.project_id
                    AND d.dispute_type = 'dispute'
                    AND d.status = 'open'
              )
              AND NOT EXISTS (
                  SELECT 1 FROM milestones p
                  WHERE p.project_id = m.project_id
                    AND p.sequence_order = (
                        SELECT MAX(q.sequence_order) FROM milestones q
                        WHERE q.project_id = m.project_id
                          AND q.sequence_order < m.sequence_order
                    )
                    AND p.status NOT IN ('approved', 'released')
              )
              AND NOT EXISTS (SELECT 1 FROM escrows e WHERE e.milestone_id = m.id)
            RETURNING {MILESTONE_COLUMNS}
            "#
        ))
        .bind(escrow.milestone_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(milestone) = milestone else {
            tx.rollback().await?;
            // A concurrent confirmation of the same reference may have won.
            return match self.get_escrow_by_payment_reference(&escrow.payment_reference).await? {
                Some(existing) => Ok(FundingRecord::AlreadyRecorded(existing)),
                None => Ok(FundingRecord::Stale),
            };
        };

        let created = sqlx::query_as::<_, Escrow>(&format!(
            r#"
            INSERT INTO escrows
            (milestone_id, project_id, client_id, company_id, amount, platform_fee, net_amount,
             payment_reference, payment_provider, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'held')
            RETURNING {ESCROW_COLUMNS}
            "#
        ))
        .bind(escrow.milestone_id)
        .bind(escrow.project_id)
        .bind(escrow.client_id)
        .bind(escrow.company_id)
        .bind(&escrow.amount)
        .bind(&escrow.platform_fee)
        .bind(&escrow.net_amount)
        .bind(&escrow.payment_reference)
        .bind(&escrow.payment_provider)
        .fetch_one(&mut *tx)
        .await?;

        let hold_reference = sqlx::query_as::<_, EscrowHoldReference>(&format!(
            r#"
            INSERT INTO escrow_hold_references
            (hold_ref, escrow_id, project_id, milestone_id, client_id, company_id,
             gateway_charge_reference, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'held')
            ON CONFLICT (hold_ref) DO NOTHING
            RETURNING {HOLD_REFERENCE_COLUMNS}
            "#
        ))
        .bind(hold_ref)
        .bind(created.id)
        .bind(created.project_id)
        .bind(created.milestone_id)
        .bind(created.client_id)
        .bind(created.company_id)
        .bind(&created.payment_reference)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(hold_reference) = hold_reference else {
            tx.rollback().await?;
            return Ok(FundingRecord::HoldRefTaken);
        };

        tx.commit().await?;

        Ok(FundingRecord::Created {
            escrow: created,
            hold_reference,
            milestone,
        })
    }

    async fn release_escrow(
        &self,
        escrow_id: Uuid,
        admin_override: bool,
        transfer_reference: String,
    ) -> Result<Option<SettledEscrow>, Error> {
        let mut tx = self.pool.begin().await?;

        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            r#"
            UPDATE escrows SET status = 'released', released_at = NOW()
            WHERE id = $1 AND status = 'held'
            RETURNING {ESCROW_COLUMNS}
            "#
        ))
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(escrow) = escrow else {
            tx.rollback().await?;
            return Ok(None);
        };

        let milestone = sqlx::query_as::<_, Milestone>(&format!(
            r#"
            UPDATE milestones SET status = 'released', updated_at = NOW()
            WHERE id = $1
              AND (status = 'approved' OR ($2 AND status <> 'released'))
            RETURNING {MILESTONE_COLUMNS}
            "#
        ))
        .bind(escrow.milestone_id)
        .bind(admin_override)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(milestone) = milestone else {
            tx.rollback().await?;
            return Ok(None);
        };

        let hold_reference = sqlx::query_as::<_, EscrowHoldReference>(&format!(
            r#"
            UPDATE escrow_hold_references
            SET status = 'released', gateway_transfer_reference = $2, updated_at = NOW()
            WHERE escrow_id = $1
            RETURNING {HOLD_REFERENCE_COLUMNS}
            "#
        ))
        .bind(escrow_id)
        .bind(transfer_reference)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(SettledEscrow {
            escrow,
            hold_reference,
            milestone,
        }))
    }

    async fn refund_escrow(
        &self,
        escrow_id: Uuid,
        refund_reference: String,
    ) -> Result<Option<SettledEscrow>, Error> {
        let mut tx = self.pool.begin().await?;

        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            r#"
            UPDATE escrows SET status = 'refunded', refunded_at = NOW()
            WHERE id = $1 AND status = 'held'
            RETURNING {ESCROW_COLUMNS}
            "#
        ))
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(escrow) = escrow else {
            tx.rollback().await?;
            return Ok(None);
        };

        let hold_reference = sqlx::query_as::<_, EscrowHoldReference>(&format!(
            r#"
            UPDATE escrow_hold_references
            SET status = 'refunded', gateway_refund_reference = $2, updated_at = NOW()
            WHERE escrow_id = $1
            RETURNING {HOLD_REFERENCE_COLUMNS}
            "#
        ))
        .bind(escrow_id)
        .bind(refund_reference)
        .fetch_optional(&mut *tx)
        .await?;

        let milestone = sqlx::query_as::<_, Milestone>(&format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = $1"
        ))
        .bind(escrow.milestone_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(SettledEscrow {
            escrow,
            hold_reference,
            milestone,
        }))
    }
}
