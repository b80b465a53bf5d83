// db/projectdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::{status_list, DBClient};
use crate::models::projectmodel::*;

const PROJECT_COLUMNS: &str = "id, client_id, company_id, consultation_id, title, description, \
    budget_min, budget_max, status, created_at, updated_at";

const MILESTONE_COLUMNS: &str = "id, project_id, title, description, amount, sequence_order, \
    status, verified_at, verified_by, client_notes, created_at, updated_at";

const EVIDENCE_COLUMNS: &str = "id, milestone_id, uploaded_by, file_url, thumbnail_url, width, \
    height, format, bytes, description, created_at";

#[async_trait]
pub trait ProjectExt {
    async fn create_project(&self, project: NewProject) -> Result<Project, Error>;

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, Error>;

    async fn get_projects_for_user(&self, user_id: Uuid) -> Result<Vec<Project>, Error>;

    /// Compare-and-set on project status. `None` when the status was not one of `expected`.
    async fn update_project_status(
        &self,
        project_id: Uuid,
        expected: &[ProjectStatus],
        to: ProjectStatus,
    ) -> Result<Option<Project>, Error>;

    async fn create_milestones(
        &self,
        project_id: Uuid,
        milestones: Vec<NewMilestone>,
    ) -> Result<Vec<Milestone>, Error>;

    async fn get_milestone(&self, milestone_id: Uuid) -> Result<Option<Milestone>, Error>;

    /// Milestones of a project ordered by sequence order.
    async fn get_project_milestones(&self, project_id: Uuid) -> Result<Vec<Milestone>, Error>;

    /// Compare-and-set on milestone status. With `dispute_gated` the write also
    /// requires that the project has no open full dispute.
    async fn transition_milestone(
        &self,
        milestone_id: Uuid,
        expected: &[MilestoneStatus],
        to: MilestoneStatus,
        dispute_gated: bool,
    ) -> Result<Option<Milestone>, Error>;

    /// Marks the milestone verified and activates the project once every
    /// milestone is verified, in one unit. `None` when the project is no longer a draft.
    async fn verify_milestone(
        &self,
        milestone_id: Uuid,
        verified_by: Uuid,
        notes: Option<String>,
    ) -> Result<Option<MilestoneVerification>, Error>;

    async fn add_evidence(&self, evidence: NewEvidence) -> Result<MilestoneEvidence, Error>;

    async fn get_milestone_evidence(&self, milestone_id: Uuid) -> Result<Vec<MilestoneEvidence>, Error>;

    async fn count_milestone_evidence(&self, milestone_id: Uuid) -> Result<i64, Error>;
}

#[async_trait]
impl ProjectExt for DBClient {
    async fn create_project(&self, project: NewProject) -> Result<Project, Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects
            (client_id, company_id, consultation_id, title, description, budget_min, budget_max)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project.client_id)
        .bind(project.company_id)
        .bind(project.consultation_id)
        .bind(project.title)
        .bind(project.description)
        .bind(project.budget_min)
        .bind(project.budget_max)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_projects_for_user(&self, user_id: Uuid) -> Result<Vec<Project>, Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS} FROM projects
            WHERE client_id = $1 OR company_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_project_status(
        &self,
        project_id: Uuid,
        expected: &[ProjectStatus],
        to: ProjectStatus,
    ) -> Result<Option<Project>, Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($3)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(to)
        .bind(status_list(expected, ProjectStatus::to_str))
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_milestones(
        &self,
        project_id: Uuid,
        milestones: Vec<NewMilestone>,
    ) -> Result<Vec<Milestone>, Error> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(milestones.len());

        for milestone in milestones {
            let row = sqlx::query_as::<_, Milestone>(&format!(
                r#"
                INSERT INTO milestones (project_id, title, description, amount, sequence_order)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {MILESTONE_COLUMNS}
                "#
            ))
            .bind(project_id)
            .bind(milestone.title)
            .bind(milestone.description)
            .bind(milestone.amount)
            .bind(milestone.sequence_order)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        created.sort_by_key(|m| m.sequence_order);
        Ok(created)
    }

    async fn get_milestone(&self, milestone_id: Uuid) -> Result<Option<Milestone>, Error> {
        sqlx::query_as::<_, Milestone>(&format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = $1"
        ))
        .bind(milestone_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_project_milestones(&self, project_id: Uuid) -> Result<Vec<Milestone>, Error> {
        sqlx::query_as::<_, Milestone>(&format!(
            r#"
            SELECT {MILESTONE_COLUMNS} FROM milestones
            WHERE project_id = $1
            ORDER BY sequence_order ASC
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn transition_milestone(
        &self,
        milestone_id: Uuid,
        expected: &[MilestoneStatus],
        to: MilestoneStatus,
        dispute_gated: bool,
    ) -> Result<Option<Milestone>, Error> {
        sqlx::query_as::<_, Milestone>(&format!(
            r#"
            UPDATE milestones m SET status = $2, updated_at = NOW()
            WHERE m.id = $1
              AND m.status::text = ANY($3)
              AND (NOT $4 OR NOT EXISTS (
                  SELECT 1 FROM disputes d
                  WHERE d.project_id = m.project_id
                    AND d.dispute_type = 'dispute'
                    AND d.status = 'open'
              ))
            RETURNING {MILESTONE_COLUMNS}
            "#
        ))
        .bind(milestone_id)
        .bind(to)
        .bind(status_list(expected, MilestoneStatus::to_str))
        .bind(dispute_gated)
        .fetch_optional(&self.pool)
        .await
    }

    async fn verify_milestone(
        &self,
        milestone_id: Uuid,
        verified_by: Uuid,
        notes: Option<String>,
    ) -> Result<Option<MilestoneVerification>, Error> {
        let mut tx = self.pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS} FROM projects
            WHERE id = (SELECT project_id FROM milestones WHERE id = $1)
            FOR UPDATE
            "#
        ))
        .bind(milestone_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(project) = project else {
            return Err(Error::RowNotFound);
        };
        if project.status != ProjectStatus::Draft {
            return Ok(None);
        }

        let milestone = sqlx::query_as::<_, Milestone>(&format!(
            r#"
            UPDATE milestones
            SET verified_at = NOW(), verified_by = $2, client_notes = COALESCE($3, client_notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MILESTONE_COLUMNS}
            "#
        ))
        .bind(milestone_id)
        .bind(verified_by)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        let unverified: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM milestones WHERE project_id = $1 AND verified_at IS NULL",
        )
        .bind(project.id)
        .fetch_one(&mut *tx)
        .await?;

        let (project, project_activated) = if unverified == 0 {
            let activated = sqlx::query_as::<_, Project>(&format!(
                r#"
                UPDATE projects SET status = 'active', updated_at = NOW()
                WHERE id = $1
                RETURNING {PROJECT_COLUMNS}
                "#
            ))
            .bind(project.id)
            .fetch_one(&mut *tx)
            .await?;
            (activated, true)
        } else {
            (project, false)
        };

        tx.commit().await?;

        Ok(Some(MilestoneVerification {
            milestone,
            project,
            project_activated,
        }))
    }

    async fn add_evidence(&self, evidence: NewEvidence) -> Result<MilestoneEvidence, Error> {
        sqlx::query_as::<_, MilestoneEvidence>(&format!(
            r#"
            INSERT INTO milestone_evidence
            (milestone_id, uploaded_by, file_url, thumbnail_url, width, height, format, bytes, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {EVIDENCE_COLUMNS}
            "#
        ))
        .bind(evidence.milestone_id)
        .bind(evidence.uploaded_by)
        .bind(evidence.file.url)
        .bind(evidence.file.thumbnail_url)
        .bind(evidence.file.width)
        .bind(evidence.file.height)
        .bind(evidence.file.format)
        .bind(evidence.file.bytes)
        .bind(evidence.description)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_milestone_evidence(&self, milestone_id: Uuid) -> Result<Vec<MilestoneEvidence>, Error> {
        sqlx::query_as::<_, MilestoneEvidence>(&format!(
            r#"
            SELECT {EVIDENCE_COLUMNS} FROM milestone_evidence
            WHERE milestone_id = $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(milestone_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn count_milestone_evidence(&self, milestone_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM milestone_evidence WHERE milestone_id = $1")
            .bind(milestone_id)
            .fetch_one(&self.pool)
            .await
    }
}
