// db/disputedb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{
    disputemodel::*,
    projectmodel::{Milestone, Project},
};

const DISPUTE_COLUMNS: &str = "id, project_id, milestone_id, dispute_type, raised_by, reason, \
    status, resolution, resolved_by, created_at, resolved_at";

const PROJECT_COLUMNS: &str = "id, client_id, company_id, consultation_id, title, description, \
    budget_min, budget_max, status, created_at, updated_at";

const MILESTONE_COLUMNS: &str = "id, project_id, title, description, amount, sequence_order, \
    status, verified_at, verified_by, client_notes, created_at, updated_at";

#[async_trait]
pub trait DisputeExt {
    /// Inserts the dispute; a full dispute also moves the project to
    /// `disputed` in the same unit. Returns the project when it changed.
    async fn open_dispute(&self, dispute: NewDispute) -> Result<(Dispute, Option<Project>), Error>;

    /// submitted -> rejected plus a revision request, in one unit.
    async fn reject_milestone(
        &self,
        milestone_id: Uuid,
        revision: NewDispute,
    ) -> Result<Option<(Milestone, Dispute)>, Error>;

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, Error>;

    async fn get_project_disputes(&self, project_id: Uuid) -> Result<Vec<Dispute>, Error>;

    async fn has_active_full_dispute(&self, project_id: Uuid) -> Result<bool, Error>;

    /// open -> resolved|escalated. `None` when the dispute was no longer open.
    async fn close_dispute(
        &self,
        dispute_id: Uuid,
        to: DisputeStatus,
        resolution: String,
        resolved_by: Uuid,
    ) -> Result<Option<Dispute>, Error>;

    /// Closes the open revision requests of a milestone; returns how many.
    async fn resolve_revision_requests(
        &self,
        milestone_id: Uuid,
        resolved_by: Uuid,
        resolution: String,
    ) -> Result<u64, Error>;
}

#[async_trait]
impl DisputeExt for DBClient {
    async fn open_dispute(&self, dispute: NewDispute) -> Result<(Dispute, Option<Project>), Error> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            INSERT INTO disputes (project_id, milestone_id, dispute_type, raised_by, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(dispute.project_id)
        .bind(dispute.milestone_id)
        .bind(dispute.dispute_type)
        .bind(dispute.raised_by)
        .bind(dispute.reason)
        .fetch_one(&mut *tx)
        .await?;

        let project = if created.dispute_type == DisputeType::Dispute {
            sqlx::query_as::<_, Project>(&format!(
                r#"
                UPDATE projects SET status = 'disputed', updated_at = NOW()
                WHERE id = $1 AND status IN ('draft', 'active')
                RETURNING {PROJECT_COLUMNS}
                "#
            ))
            .bind(created.project_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        tx.commit().await?;
        Ok((created, project))
    }

    async fn reject_milestone(
        &self,
        milestone_id: Uuid,
        revision: NewDispute,
    ) -> Result<Option<(Milestone, Dispute)>, Error> {
        let mut tx = self.pool.begin().await?;

        let milestone = sqlx::query_as::<_, Milestone>(&format!(
            r#"
            UPDATE milestones SET status = 'rejected', updated_at = NOW()
            WHERE id = $1 AND status = 'submitted'
            RETURNING {MILESTONE_COLUMNS}
            "#
        ))
        .bind(milestone_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(milestone) = milestone else {
            tx.rollback().await?;
            return Ok(None);
        };

        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            INSERT INTO disputes (project_id, milestone_id, dispute_type, raised_by, reason)
            VALUES ($1, $2, 'revision_request', $3, $4)
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(revision.project_id)
        .bind(Some(milestone_id))
        .bind(revision.raised_by)
        .bind(revision.reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((milestone, dispute)))
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!("SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1"))
            .bind(dispute_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_project_disputes(&self, project_id: Uuid) -> Result<Vec<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE project_id = $1 ORDER BY created_at DESC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn has_active_full_dispute(&self, project_id: Uuid) -> Result<bool, Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM disputes
                WHERE project_id = $1 AND dispute_type = 'dispute' AND status = 'open'
            )
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn close_dispute(
        &self,
        dispute_id: Uuid,
        to: DisputeStatus,
        resolution: String,
        resolved_by: Uuid,
    ) -> Result<Option<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET status = $2, resolution = $3, resolved_by = $4, resolved_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(dispute_id)
        .bind(to)
        .bind(resolution)
        .bind(resolved_by)
        .fetch_optional(&self.pool)
        .await
    }

    async fn resolve_revision_requests(
        &self,
        milestone_id: Uuid,
        resolved_by: Uuid,
        resolution: String,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE disputes
            SET status = 'resolved', resolution = $3, resolved_by = $2, resolved_at = NOW()
            WHERE milestone_id = $1 AND dispute_type = 'revision_request' AND status = 'open'
            "#,
        )
        .bind(milestone_id)
        .bind(resolved_by)
        .bind(resolution)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
