// service/project_service.rs
use std::{collections::HashSet, sync::Arc};

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        consultationmodel::ConsultationStatus,
        projectmodel::*,
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        milestone_machine::{all_released, all_verified},
        notification_service::{NotificationService, NotificationTemplate},
    },
    utils::currency::is_positive,
};

pub struct ProjectService {
    db: Arc<dyn MarketStore>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
}

impl ProjectService {
    pub fn new(
        db: Arc<dyn MarketStore>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self { db, audit, notifications }
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<Project, ServiceError> {
        self.db
            .get_project(project_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound(project_id))
    }

    pub async fn get_projects_for_user(&self, user_id: Uuid) -> Result<Vec<Project>, ServiceError> {
        Ok(self.db.get_projects_for_user(user_id).await?)
    }

    pub async fn get_project_milestones(&self, project_id: Uuid) -> Result<Vec<Milestone>, ServiceError> {
        self.get_project(project_id).await?;
        Ok(self.db.get_project_milestones(project_id).await?)
    }

    pub async fn create_project_from_consultation(
        &self,
        consultation_id: Uuid,
        actor_id: Uuid,
        title: String,
        description: Option<String>,
        budget_min: BigDecimal,
        budget_max: BigDecimal,
    ) -> Result<Project, ServiceError> {
        let consultation = self
            .db
            .get_consultation(consultation_id)
            .await?
            .ok_or(ServiceError::ConsultationNotFound(consultation_id))?;

        if consultation.client_id != actor_id {
            return Err(ServiceError::Validation(
                "Only the client who booked the consultation can start a project from it".to_string(),
            ));
        }
        if consultation.status != ConsultationStatus::Completed {
            return Err(ServiceError::InvalidConsultationStatus(consultation.id, consultation.status));
        }
        if !is_positive(&budget_min) || budget_min > budget_max {
            return Err(ServiceError::Validation(
                "Budget range must be positive with budget_min <= budget_max".to_string(),
            ));
        }

        let project = self
            .db
            .create_project(NewProject {
                client_id: consultation.client_id,
                company_id: consultation.company_id,
                consultation_id: Some(consultation.id),
                title,
                description,
                budget_min,
                budget_max,
            })
            .await?;

        tracing::info!("Project {} created from consultation {}", project.id, consultation.id);
        self.audit.log_project_created(actor_id, &project).await;
        Ok(project)
    }

    /// Bulk creation by the company while the project is still a draft.
    pub async fn create_milestones(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        milestones: Vec<NewMilestone>,
    ) -> Result<Vec<Milestone>, ServiceError> {
        let project = self.get_project(project_id).await?;
        if project.status != ProjectStatus::Draft {
            return Err(ServiceError::InvalidProjectStatus {
                project_id,
                status: project.status,
                required: "draft",
            });
        }
        if milestones.is_empty() {
            return Err(ServiceError::Validation("At least one milestone is required".to_string()));
        }

        let existing: HashSet<i32> = self
            .db
            .get_project_milestones(project_id)
            .await?
            .iter()
            .map(|m| m.sequence_order)
            .collect();
        let mut seen = HashSet::new();
        for m in &milestones {
            if m.sequence_order <= 0 {
                return Err(ServiceError::Validation(format!(
                    "Sequence order must be positive, got {}",
                    m.sequence_order
                )));
            }
            if !seen.insert(m.sequence_order) || existing.contains(&m.sequence_order) {
                return Err(ServiceError::Validation(format!(
                    "Sequence order {} is used more than once in this project",
                    m.sequence_order
                )));
            }
            if !is_positive(&m.amount) {
                return Err(ServiceError::Validation(format!(
                    "Milestone '{}' must have a positive amount",
                    m.title
                )));
            }
        }

        let created = self.db.create_milestones(project_id, milestones).await?;
        tracing::info!("{} milestones created for project {}", created.len(), project_id);
        self.audit.log_milestones_created(actor_id, project_id, &created).await;
        Ok(created)
    }

    /// One-time client confirmation of a milestone's terms. The last one
    /// activates the project in the same write.
    pub async fn verify_milestone(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> Result<MilestoneVerification, ServiceError> {
        let milestone = self
            .db
            .get_milestone(milestone_id)
            .await?
            .ok_or(ServiceError::MilestoneNotFound(milestone_id))?;
        let project = self.get_project(milestone.project_id).await?;

        if project.status != ProjectStatus::Draft {
            return Err(ServiceError::InvalidProjectStatus {
                project_id: project.id,
                status: project.status,
                required: "draft",
            });
        }
        if milestone.verified_at.is_some() {
            return Err(ServiceError::Validation(format!(
                "Milestone {} is already verified",
                milestone_id
            )));
        }

        let verification = match self.db.verify_milestone(milestone_id, actor_id, notes).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                let current = self.get_project(project.id).await?;
                return Err(ServiceError::InvalidProjectStatus {
                    project_id: current.id,
                    status: current.status,
                    required: "draft",
                });
            }
            Err(sqlx::Error::RowNotFound) => return Err(ServiceError::MilestoneNotFound(milestone_id)),
            Err(e) => return Err(e.into()),
        };

        self.audit.log_milestone_verified(actor_id, &verification.milestone).await;

        if verification.project_activated {
            tracing::info!("All milestones verified, project {} is now active", project.id);
            self.audit
                .log_project_status(actor_id, &verification.project, ProjectStatus::Draft, "all milestones verified")
                .await;
            self.notifications
                .notify_project_parties(&verification.project, NotificationTemplate::ProjectActivated);
        }

        Ok(verification)
    }

    pub async fn complete_project(&self, project_id: Uuid, actor_id: Uuid) -> Result<Project, ServiceError> {
        let project = self.get_project(project_id).await?;
        if project.status != ProjectStatus::Active {
            return Err(ServiceError::InvalidProjectStatus {
                project_id,
                status: project.status,
                required: "active",
            });
        }

        let milestones = self.db.get_project_milestones(project_id).await?;
        if !all_released(&milestones) {
            return Err(ServiceError::Validation(format!(
                "Project {} still has milestones that are not released",
                project_id
            )));
        }

        let completed = self
            .db
            .update_project_status(project_id, &[ProjectStatus::Active], ProjectStatus::Completed)
            .await?
            .ok_or(ServiceError::ConcurrentModification { entity: "project", id: project_id })?;

        tracing::info!("Project {} completed", project_id);
        self.audit
            .log_project_status(actor_id, &completed, ProjectStatus::Active, "all milestones released")
            .await;
        self.notifications
            .notify_project_parties(&completed, NotificationTemplate::ProjectCompleted);
        Ok(completed)
    }

    /// Completes an active project once its last milestone is released.
    /// Disputed projects are left for dispute resolution to restore.
    pub async fn evaluate_completion(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<Project>, ServiceError> {
        let project = self.get_project(project_id).await?;
        if project.status != ProjectStatus::Active {
            return Ok(None);
        }
        let milestones = self.db.get_project_milestones(project_id).await?;
        if !all_released(&milestones) {
            return Ok(None);
        }

        match self.complete_project(project_id, actor_id).await {
            Ok(project) => Ok(Some(project)),
            Err(ServiceError::ConcurrentModification { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Status a disputed project returns to once its last open full dispute
    /// is closed.
    pub async fn restored_status(&self, project_id: Uuid) -> Result<ProjectStatus, ServiceError> {
        let milestones = self.db.get_project_milestones(project_id).await?;
        Ok(if all_released(&milestones) {
            ProjectStatus::Completed
        } else if all_verified(&milestones) {
            ProjectStatus::Active
        } else {
            ProjectStatus::Draft
        })
    }

    pub async fn cancel_project(&self, project_id: Uuid, actor_id: Uuid) -> Result<Project, ServiceError> {
        let project = self.get_project(project_id).await?;
        if project.client_id != actor_id {
            return Err(ServiceError::NotProjectParty(actor_id, project_id));
        }

        let cancelled = self
            .db
            .update_project_status(project_id, &[ProjectStatus::Draft], ProjectStatus::Cancelled)
            .await?;
        let cancelled = match cancelled {
            Some(p) => p,
            None => {
                let current = self.get_project(project_id).await?;
                return Err(ServiceError::InvalidProjectStatus {
                    project_id,
                    status: current.status,
                    required: "draft",
                });
            }
        };

        tracing::info!("Project {} cancelled by {}", project_id, actor_id);
        self.audit
            .log_project_status(actor_id, &cancelled, ProjectStatus::Draft, "cancelled by client")
            .await;
        Ok(cancelled)
    }
}
