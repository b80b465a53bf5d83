// service/dispute_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        disputemodel::*,
        projectmodel::ProjectStatus,
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        notification_service::{NotificationService, NotificationTemplate},
        project_service::ProjectService,
    },
};

pub struct DisputeService {
    db: Arc<dyn MarketStore>,
    projects: Arc<ProjectService>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
}

impl DisputeService {
    pub fn new(
        db: Arc<dyn MarketStore>,
        projects: Arc<ProjectService>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self { db, projects, audit, notifications }
    }

    /// True while the project has an open dispute of type `dispute`.
    /// Revision requests never count.
    pub async fn has_active_full_dispute(&self, project_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.db.has_active_full_dispute(project_id).await?)
    }

    pub async fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute, ServiceError> {
        self.db
            .get_dispute(dispute_id)
            .await?
            .ok_or(ServiceError::DisputeNotFound(dispute_id))
    }

    pub async fn get_project_disputes(&self, project_id: Uuid) -> Result<Vec<Dispute>, ServiceError> {
        self.projects.get_project(project_id).await?;
        Ok(self.db.get_project_disputes(project_id).await?)
    }

    /// Opens a full dispute; the project moves to `disputed` in the same write.
    pub async fn raise_dispute(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        milestone_id: Option<Uuid>,
        reason: String,
    ) -> Result<Dispute, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation("A dispute reason is required".to_string()));
        }

        let project = self.projects.get_project(project_id).await?;
        if matches!(project.status, ProjectStatus::Completed | ProjectStatus::Cancelled) {
            return Err(ServiceError::InvalidProjectStatus {
                project_id,
                status: project.status,
                required: "draft, active or disputed",
            });
        }
        if let Some(milestone_id) = milestone_id {
            self.db
                .get_milestone(milestone_id)
                .await?
                .filter(|m| m.project_id == project_id)
                .ok_or(ServiceError::MilestoneNotFound(milestone_id))?;
        }

        let (dispute, disputed_project) = self
            .db
            .open_dispute(NewDispute {
                project_id,
                milestone_id,
                dispute_type: DisputeType::Dispute,
                raised_by: actor_id,
                reason,
            })
            .await?;

        tracing::warn!("Dispute {} opened on project {} by {}", dispute.id, project_id, actor_id);
        self.audit.log_dispute_opened(actor_id, &dispute).await;
        if let Some(disputed) = &disputed_project {
            self.audit
                .log_project_status(actor_id, disputed, project.status, "dispute opened")
                .await;
        }

        let counterparty = if actor_id == project.client_id {
            project.company_id
        } else {
            project.client_id
        };
        self.notifications
            .notify_dispute(counterparty, &dispute, NotificationTemplate::DisputeRaised);
        Ok(dispute)
    }

    /// Admin resolution. Only open disputes close, and never back to open.
    /// Closing the last open full dispute restores the project.
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        actor_id: Uuid,
        outcome: DisputeStatus,
        resolution: String,
    ) -> Result<Dispute, ServiceError> {
        if outcome == DisputeStatus::Open {
            return Err(ServiceError::Validation(
                "A dispute can only be resolved or escalated".to_string(),
            ));
        }
        if resolution.trim().is_empty() {
            return Err(ServiceError::Validation("A resolution note is required".to_string()));
        }

        let existing = self.get_dispute(dispute_id).await?;
        if existing.status != DisputeStatus::Open {
            return Err(ServiceError::InvalidDisputeStatus(dispute_id, existing.status));
        }

        let closed = match self.db.close_dispute(dispute_id, outcome, resolution, actor_id).await? {
            Some(d) => d,
            None => {
                let current = self.get_dispute(dispute_id).await?;
                return Err(ServiceError::InvalidDisputeStatus(dispute_id, current.status));
            }
        };

        tracing::info!("Dispute {} closed as {}", dispute_id, closed.status);
        self.audit.log_dispute_closed(actor_id, &closed).await;

        if closed.dispute_type == DisputeType::Dispute {
            self.restore_project(closed.project_id, actor_id).await?;
        }

        let project = self.projects.get_project(closed.project_id).await?;
        self.notifications
            .notify_dispute(project.client_id, &closed, NotificationTemplate::DisputeClosed);
        self.notifications
            .notify_dispute(project.company_id, &closed, NotificationTemplate::DisputeClosed);
        Ok(closed)
    }

    async fn restore_project(&self, project_id: Uuid, actor_id: Uuid) -> Result<(), ServiceError> {
        if self.db.has_active_full_dispute(project_id).await? {
            return Ok(());
        }
        let target = self.projects.restored_status(project_id).await?;
        let restored = self
            .db
            .update_project_status(project_id, &[ProjectStatus::Disputed], target)
            .await?;

        if let Some(project) = restored {
            tracing::info!("Project {} restored to {} after dispute resolution", project_id, target);
            self.audit
                .log_project_status(actor_id, &project, ProjectStatus::Disputed, "last dispute closed")
                .await;
            if target == ProjectStatus::Completed {
                self.notifications
                    .notify_project_parties(&project, NotificationTemplate::ProjectCompleted);
            }
        }
        Ok(())
    }
}
