// service/milestone_service.rs
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        disputemodel::{Dispute, DisputeType, NewDispute},
        projectmodel::*,
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        milestone_machine::{ensure_approvable, ensure_rejectable, ensure_submittable},
        notification_service::{NotificationService, NotificationTemplate},
    },
};

pub struct MilestoneService {
    db: Arc<dyn MarketStore>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
}

impl MilestoneService {
    pub fn new(
        db: Arc<dyn MarketStore>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self { db, audit, notifications }
    }

    pub async fn get_milestone(&self, milestone_id: Uuid) -> Result<Milestone, ServiceError> {
        self.db
            .get_milestone(milestone_id)
            .await?
            .ok_or(ServiceError::MilestoneNotFound(milestone_id))
    }

    pub async fn get_evidence(&self, milestone_id: Uuid) -> Result<Vec<MilestoneEvidence>, ServiceError> {
        self.get_milestone(milestone_id).await?;
        Ok(self.db.get_milestone_evidence(milestone_id).await?)
    }

    async fn project_of(&self, milestone: &Milestone) -> Result<Project, ServiceError> {
        self.db
            .get_project(milestone.project_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound(milestone.project_id))
    }

    /// Attaches a blob-store upload to a milestone that is being worked on.
    pub async fn add_evidence(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        file: UploadedFile,
        description: Option<String>,
    ) -> Result<MilestoneEvidence, ServiceError> {
        let milestone = self.get_milestone(milestone_id).await?;
        if !matches!(
            milestone.status,
            MilestoneStatus::Funded | MilestoneStatus::Rejected | MilestoneStatus::Submitted
        ) {
            return Err(ServiceError::InvalidMilestoneTransition {
                milestone_id,
                action: "add evidence to",
                status: milestone.status,
            });
        }
        if file.url.trim().is_empty() || file.bytes <= 0 {
            return Err(ServiceError::Validation("Uploaded file must have a url and a size".to_string()));
        }

        let file_url = file.url.clone();
        let evidence = self
            .db
            .add_evidence(NewEvidence {
                milestone_id,
                uploaded_by: actor_id,
                file,
                description,
            })
            .await?;

        self.audit
            .log_evidence_added(actor_id, &milestone, evidence.id, &file_url)
            .await;
        Ok(evidence)
    }

    /// funded (or rejected) -> submitted. Resubmitting a rejected milestone
    /// closes its open revision requests.
    pub async fn submit(&self, milestone_id: Uuid, actor_id: Uuid) -> Result<Milestone, ServiceError> {
        let milestone = self.get_milestone(milestone_id).await?;
        let escrow = self.db.get_escrow_by_milestone(milestone_id).await?;
        let evidence_count = self.db.count_milestone_evidence(milestone_id).await?;
        ensure_submittable(&milestone, escrow.as_ref(), evidence_count)?;

        let from = milestone.status;
        let submitted = self
            .db
            .transition_milestone(milestone_id, &[from], MilestoneStatus::Submitted, false)
            .await?
            .ok_or(ServiceError::ConcurrentModification { entity: "milestone", id: milestone_id })?;

        if from == MilestoneStatus::Rejected {
            let closed = self
                .db
                .resolve_revision_requests(milestone_id, actor_id, "Resubmitted with new evidence".to_string())
                .await?;
            tracing::info!("Milestone {} resubmitted, {} revision requests closed", milestone_id, closed);
        }

        tracing::info!("Milestone {} submitted by {}", milestone_id, actor_id);
        self.audit
            .log_milestone_transition(actor_id, &submitted, from, json!({ "evidence_count": evidence_count }))
            .await;
        let project = self.project_of(&submitted).await?;
        self.notifications
            .notify_milestone(project.client_id, &submitted, NotificationTemplate::MilestoneSubmitted);
        Ok(submitted)
    }

    pub async fn approve(&self, milestone_id: Uuid, actor_id: Uuid) -> Result<Milestone, ServiceError> {
        let milestone = self.get_milestone(milestone_id).await?;
        let evidence_count = self.db.count_milestone_evidence(milestone_id).await?;
        let active_dispute = self.db.has_active_full_dispute(milestone.project_id).await?;
        ensure_approvable(&milestone, evidence_count, active_dispute)?;

        let approved = self
            .db
            .transition_milestone(milestone_id, &[MilestoneStatus::Submitted], MilestoneStatus::Approved, true)
            .await?;
        let approved = match approved {
            Some(m) => m,
            None => {
                let current = self.get_milestone(milestone_id).await?;
                let active_dispute = self.db.has_active_full_dispute(current.project_id).await?;
                ensure_approvable(&current, evidence_count, active_dispute)?;
                return Err(ServiceError::ConcurrentModification { entity: "milestone", id: milestone_id });
            }
        };

        tracing::info!("Milestone {} approved by {}", milestone_id, actor_id);
        self.audit
            .log_milestone_transition(actor_id, &approved, MilestoneStatus::Submitted, json!({}))
            .await;
        let project = self.project_of(&approved).await?;
        self.notifications
            .notify_milestone(project.company_id, &approved, NotificationTemplate::MilestoneApproved);
        Ok(approved)
    }

    /// submitted -> rejected, opening a revision request in the same write.
    /// The project status is untouched.
    pub async fn reject(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        reason: String,
    ) -> Result<(Milestone, Dispute), ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation("A rejection reason is required".to_string()));
        }
        let milestone = self.get_milestone(milestone_id).await?;
        ensure_rejectable(&milestone)?;

        let (rejected, revision) = self
            .db
            .reject_milestone(
                milestone_id,
                NewDispute {
                    project_id: milestone.project_id,
                    milestone_id: Some(milestone_id),
                    dispute_type: DisputeType::RevisionRequest,
                    raised_by: actor_id,
                    reason,
                },
            )
            .await?
            .ok_or(ServiceError::ConcurrentModification { entity: "milestone", id: milestone_id })?;

        tracing::info!("Milestone {} rejected, revision request {} opened", milestone_id, revision.id);
        self.audit
            .log_milestone_transition(
                actor_id,
                &rejected,
                MilestoneStatus::Submitted,
                json!({ "revision_request_id": revision.id, "reason": revision.reason }),
            )
            .await;
        self.audit.log_dispute_opened(actor_id, &revision).await;
        let project = self.project_of(&rejected).await?;
        self.notifications
            .notify_milestone(project.company_id, &rejected, NotificationTemplate::MilestoneRejected);
        Ok((rejected, revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::disputemodel::DisputeStatus,
        service::testutil::Harness,
    };

    #[tokio::test]
    async fn submit_requires_evidence() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        h.fund(&milestones[0]).await;

        assert!(matches!(
            h.milestones.submit(milestones[0].id, project.company_id).await,
            Err(ServiceError::MissingEvidence(_))
        ));

        h.add_evidence(&milestones[0], project.company_id).await;
        let submitted = h.milestones.submit(milestones[0].id, project.company_id).await.unwrap();
        assert_eq!(submitted.status, MilestoneStatus::Submitted);
    }

    #[tokio::test]
    async fn marked_funded_milestone_is_still_paid_into_escrow() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100", "200"]).await;
        h.escrow.mark_funded(milestones[0].id, project.company_id).await.unwrap();
        h.add_evidence(&milestones[0], project.company_id).await;

        assert!(matches!(
            h.milestones.submit(milestones[0].id, project.company_id).await,
            Err(ServiceError::EscrowNotFound(_))
        ));
        assert!(matches!(
            h.escrow.mark_funded(milestones[0].id, project.company_id).await,
            Err(ServiceError::InvalidMilestoneTransition { .. })
        ));

        let escrow = h.fund(&milestones[0]).await;
        assert_eq!(escrow.milestone_id, milestones[0].id);

        h.milestones.submit(milestones[0].id, project.company_id).await.unwrap();
        h.milestones.approve(milestones[0].id, project.client_id).await.unwrap();
        h.add_payout_account(project.company_id).await;
        let settled = h
            .escrow
            .release(milestones[0].id, project.client_id, false, None)
            .await
            .unwrap();
        assert_eq!(settled.milestone.status, MilestoneStatus::Released);
        assert_eq!(h.gateway.transfer_count(), 1);

        let next = h.fund(&milestones[1]).await;
        assert_eq!(next.milestone_id, milestones[1].id);
    }

    #[tokio::test]
    async fn evidence_only_while_work_is_in_progress() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;

        let early = h
            .milestones
            .add_evidence(milestones[0].id, project.company_id, Harness::uploaded_file(), None)
            .await;
        assert!(matches!(early, Err(ServiceError::InvalidMilestoneTransition { .. })));

        h.fund(&milestones[0]).await;
        let mut empty = Harness::uploaded_file();
        empty.bytes = 0;
        assert!(matches!(
            h.milestones.add_evidence(milestones[0].id, project.company_id, empty, None).await,
            Err(ServiceError::Validation(_))
        ));
        let evidence = h
            .milestones
            .add_evidence(milestones[0].id, project.company_id, Harness::uploaded_file(), Some("Site photo".into()))
            .await
            .unwrap();
        assert_eq!(evidence.uploaded_by, project.company_id);
        assert_eq!(h.milestones.get_evidence(milestones[0].id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_opens_revision_request_without_disputing_project() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        h.fund(&milestones[0]).await;
        h.add_evidence(&milestones[0], project.company_id).await;
        h.milestones.submit(milestones[0].id, project.company_id).await.unwrap();

        let (rejected, revision) = h
            .milestones
            .reject(milestones[0].id, project.client_id, "incomplete drawing".into())
            .await
            .unwrap();

        assert_eq!(rejected.status, MilestoneStatus::Rejected);
        assert_eq!(revision.dispute_type, DisputeType::RevisionRequest);
        assert_eq!(revision.status, DisputeStatus::Open);
        assert_eq!(revision.reason, "incomplete drawing");
        assert_eq!(revision.milestone_id, Some(milestones[0].id));
        assert_eq!(h.projects.get_project(project.id).await.unwrap().status, ProjectStatus::Active);
        assert!(!h.disputes.has_active_full_dispute(project.id).await.unwrap());
    }

    #[tokio::test]
    async fn rejected_milestone_resubmits_and_closes_revision_request() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        h.fund(&milestones[0]).await;
        h.add_evidence(&milestones[0], project.company_id).await;
        h.milestones.submit(milestones[0].id, project.company_id).await.unwrap();
        let (_, revision) = h
            .milestones
            .reject(milestones[0].id, project.client_id, "blurry photos".into())
            .await
            .unwrap();

        h.add_evidence(&milestones[0], project.company_id).await;
        let resubmitted = h.milestones.submit(milestones[0].id, project.company_id).await.unwrap();
        assert_eq!(resubmitted.status, MilestoneStatus::Submitted);

        let closed = h.disputes.get_dispute(revision.id).await.unwrap();
        assert_eq!(closed.status, DisputeStatus::Resolved);
        assert_eq!(closed.resolved_by, Some(project.company_id));

        let approved = h.milestones.approve(milestones[0].id, project.client_id).await.unwrap();
        assert_eq!(approved.status, MilestoneStatus::Approved);
    }

    #[tokio::test]
    async fn approval_blocked_by_full_dispute_only() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        h.fund(&milestones[0]).await;
        h.add_evidence(&milestones[0], project.company_id).await;
        h.milestones.submit(milestones[0].id, project.company_id).await.unwrap();

        h.disputes
            .raise_dispute(project.id, project.company_id, Some(milestones[0].id), "Scope changed".into())
            .await
            .unwrap();
        assert!(matches!(
            h.milestones.approve(milestones[0].id, project.client_id).await,
            Err(ServiceError::ActiveDispute(_))
        ));
        assert_eq!(
            h.milestones.get_milestone(milestones[0].id).await.unwrap().status,
            MilestoneStatus::Submitted
        );
    }

    #[tokio::test]
    async fn cannot_approve_or_reject_unsubmitted_milestone() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        h.fund(&milestones[0]).await;

        assert!(matches!(
            h.milestones.approve(milestones[0].id, project.client_id).await,
            Err(ServiceError::InvalidMilestoneTransition { action: "approve", .. })
        ));
        assert!(matches!(
            h.milestones.reject(milestones[0].id, project.client_id, "no".into()).await,
            Err(ServiceError::InvalidMilestoneTransition { action: "reject", .. })
        ));
        assert!(matches!(
            h.milestones.reject(milestones[0].id, project.client_id, "  ".into()).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
