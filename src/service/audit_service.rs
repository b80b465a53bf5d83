// service/audit_service.rs
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        auditmodel::{AuditLog, NewAuditEntry},
        consultationmodel::Consultation,
        disputemodel::Dispute,
        escrowmodel::{Escrow, EscrowHoldReference},
        paymentmodel::PaymentAccount,
        projectmodel::{Milestone, MilestoneStatus, Project, ProjectStatus},
    },
    service::error::ServiceError,
};

pub mod actions {
    pub const PROJECT_CREATED: &str = "project_created";
    pub const PROJECT_STATUS_CHANGED: &str = "project_status_changed";
    pub const MILESTONES_CREATED: &str = "milestones_created";
    pub const MILESTONE_VERIFIED: &str = "milestone_verified";
    pub const MILESTONE_TRANSITION: &str = "milestone_transition";
    pub const EVIDENCE_ADDED: &str = "evidence_added";
    pub const ESCROW_FUNDED: &str = "escrow_funded";
    pub const ESCROW_RELEASED: &str = "escrow_released";
    pub const ESCROW_REFUNDED: &str = "escrow_refunded";
    pub const DISPUTE_OPENED: &str = "dispute_opened";
    pub const DISPUTE_CLOSED: &str = "dispute_closed";
    pub const CONSULTATION_PAID: &str = "consultation_paid";
    pub const CONSULTATION_STATUS_CHANGED: &str = "consultation_status_changed";
    pub const PAYMENT_ACCOUNT_ADDED: &str = "payment_account_added";
    pub const PAYMENT_ACCOUNT_DEFAULT_SET: &str = "payment_account_default_set";
}

/// Writes happen after the state change has committed. A failed audit write
/// is logged and does not undo or fail the operation it describes.
pub struct AuditService {
    db: Arc<dyn MarketStore>,
}

impl AuditService {
    pub fn new(db: Arc<dyn MarketStore>) -> Self {
        Self { db }
    }

    pub async fn get_project_audit(&self, project_id: Uuid) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(self.db.get_project_audit(project_id).await?)
    }

    pub async fn log_project_created(&self, actor_id: Uuid, project: &Project) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::PROJECT_CREATED.to_string(),
            project_id: Some(project.id),
            milestone_id: None,
            escrow_id: None,
            details: json!({
                "consultation_id": project.consultation_id,
                "client_id": project.client_id,
                "company_id": project.company_id,
                "budget_min": project.budget_min,
                "budget_max": project.budget_max,
            }),
            description: format!("Project '{}' created", project.title),
        })
        .await
    }

    pub async fn log_project_status(
        &self,
        actor_id: Uuid,
        project: &Project,
        from: ProjectStatus,
        reason: &str,
    ) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::PROJECT_STATUS_CHANGED.to_string(),
            project_id: Some(project.id),
            milestone_id: None,
            escrow_id: None,
            details: json!({
                "from": from.to_str(),
                "to": project.status.to_str(),
                "reason": reason,
            }),
            description: format!("Project moved from {} to {}", from, project.status),
        })
        .await
    }

    pub async fn log_milestones_created(&self, actor_id: Uuid, project_id: Uuid, milestones: &[Milestone]) {
        let ids: Vec<Uuid> = milestones.iter().map(|m| m.id).collect();
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::MILESTONES_CREATED.to_string(),
            project_id: Some(project_id),
            milestone_id: None,
            escrow_id: None,
            details: json!({ "milestone_ids": ids, "count": milestones.len() }),
            description: format!("{} milestones created", milestones.len()),
        })
        .await
    }

    pub async fn log_milestone_verified(&self, actor_id: Uuid, milestone: &Milestone) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::MILESTONE_VERIFIED.to_string(),
            project_id: Some(milestone.project_id),
            milestone_id: Some(milestone.id),
            escrow_id: None,
            details: json!({ "notes": milestone.client_notes }),
            description: format!("Milestone '{}' verified", milestone.title),
        })
        .await
    }

    pub async fn log_milestone_transition(
        &self,
        actor_id: Uuid,
        milestone: &Milestone,
        from: MilestoneStatus,
        details: serde_json::Value,
    ) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::MILESTONE_TRANSITION.to_string(),
            project_id: Some(milestone.project_id),
            milestone_id: Some(milestone.id),
            escrow_id: None,
            details: json!({
                "from": from.to_str(),
                "to": milestone.status.to_str(),
                "context": details,
            }),
            description: format!("Milestone '{}' {} -> {}", milestone.title, from, milestone.status),
        })
        .await
    }

    pub async fn log_evidence_added(&self, actor_id: Uuid, milestone: &Milestone, evidence_id: Uuid, file_url: &str) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::EVIDENCE_ADDED.to_string(),
            project_id: Some(milestone.project_id),
            milestone_id: Some(milestone.id),
            escrow_id: None,
            details: json!({ "evidence_id": evidence_id, "file_url": file_url }),
            description: "Milestone evidence uploaded".to_string(),
        })
        .await
    }

    pub async fn log_escrow_funded(&self, actor_id: Uuid, escrow: &Escrow, hold_reference: &EscrowHoldReference) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::ESCROW_FUNDED.to_string(),
            project_id: Some(escrow.project_id),
            milestone_id: Some(escrow.milestone_id),
            escrow_id: Some(escrow.id),
            details: Self::escrow_details(escrow, Some(&hold_reference.hold_ref), json!({
                "payment_reference": escrow.payment_reference,
                "payment_provider": escrow.payment_provider,
            })),
            description: format!("Escrow {} funded", hold_reference.hold_ref),
        })
        .await
    }

    pub async fn log_escrow_released(
        &self,
        actor_id: Uuid,
        escrow: &Escrow,
        hold_ref: Option<&str>,
        transfer_reference: &str,
        admin_override: bool,
    ) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::ESCROW_RELEASED.to_string(),
            project_id: Some(escrow.project_id),
            milestone_id: Some(escrow.milestone_id),
            escrow_id: Some(escrow.id),
            details: Self::escrow_details(escrow, hold_ref, json!({
                "transfer_reference": transfer_reference,
                "admin_override": admin_override,
            })),
            description: "Escrow released to company".to_string(),
        })
        .await
    }

    pub async fn log_escrow_refunded(
        &self,
        actor_id: Uuid,
        escrow: &Escrow,
        hold_ref: Option<&str>,
        refund_reference: &str,
        reason: &str,
    ) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::ESCROW_REFUNDED.to_string(),
            project_id: Some(escrow.project_id),
            milestone_id: Some(escrow.milestone_id),
            escrow_id: Some(escrow.id),
            details: Self::escrow_details(escrow, hold_ref, json!({
                "refund_reference": refund_reference,
                "reason": reason,
            })),
            description: "Escrow refunded to client".to_string(),
        })
        .await
    }

    pub async fn log_dispute_opened(&self, actor_id: Uuid, dispute: &Dispute) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::DISPUTE_OPENED.to_string(),
            project_id: Some(dispute.project_id),
            milestone_id: dispute.milestone_id,
            escrow_id: None,
            details: json!({
                "dispute_id": dispute.id,
                "dispute_type": dispute.dispute_type.to_str(),
                "reason": dispute.reason,
            }),
            description: format!("{} opened", dispute.dispute_type),
        })
        .await
    }

    pub async fn log_dispute_closed(&self, actor_id: Uuid, dispute: &Dispute) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::DISPUTE_CLOSED.to_string(),
            project_id: Some(dispute.project_id),
            milestone_id: dispute.milestone_id,
            escrow_id: None,
            details: json!({
                "dispute_id": dispute.id,
                "status": dispute.status.to_str(),
                "resolution": dispute.resolution,
            }),
            description: format!("Dispute {}", dispute.status),
        })
        .await
    }

    pub async fn log_consultation_paid(&self, consultation: &Consultation) {
        self.log_audit_event(NewAuditEntry {
            actor_id: consultation.client_id,
            action: actions::CONSULTATION_PAID.to_string(),
            project_id: None,
            milestone_id: None,
            escrow_id: None,
            details: json!({
                "consultation_id": consultation.id,
                "payment_reference": consultation.payment_reference,
                "fee": consultation.fee,
            }),
            description: "Consultation fee paid".to_string(),
        })
        .await
    }

    pub async fn log_consultation_status(&self, actor_id: Uuid, consultation: &Consultation) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: actions::CONSULTATION_STATUS_CHANGED.to_string(),
            project_id: None,
            milestone_id: None,
            escrow_id: None,
            details: json!({
                "consultation_id": consultation.id,
                "status": consultation.status.to_str(),
            }),
            description: format!("Consultation {}", consultation.status),
        })
        .await
    }

    pub async fn log_payment_account(&self, actor_id: Uuid, account: &PaymentAccount, action: &'static str) {
        self.log_audit_event(NewAuditEntry {
            actor_id,
            action: action.to_string(),
            project_id: None,
            milestone_id: None,
            escrow_id: None,
            details: json!({
                "account_id": account.id,
                "bank_code": account.bank_code,
                "is_default": account.is_default,
            }),
            description: format!("Payment account at {}", account.bank_name),
        })
        .await
    }

    /// Both parties are stored so history can be projected per user.
    fn escrow_details(escrow: &Escrow, hold_ref: Option<&str>, extra: serde_json::Value) -> serde_json::Value {
        let mut details = json!({
            "client_id": escrow.client_id.to_string(),
            "company_id": escrow.company_id.to_string(),
            "amount": escrow.amount.to_string(),
            "platform_fee": escrow.platform_fee.to_string(),
            "net_amount": escrow.net_amount.to_string(),
            "hold_ref": hold_ref,
        });
        if let (Some(target), serde_json::Value::Object(extra)) = (details.as_object_mut(), extra) {
            target.extend(extra);
        }
        details
    }

    async fn log_audit_event(&self, entry: NewAuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.db.append_audit(entry).await {
            tracing::error!("Failed to write audit entry {}: {}", action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::service::testutil::Harness;

    use super::actions;

    #[tokio::test]
    async fn money_movements_leave_a_project_trail() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        h.add_payout_account(project.company_id).await;
        h.approved_milestone(&milestones[0], &project).await;
        h.escrow.release(milestones[0].id, project.client_id, false, None).await.unwrap();

        let trail = h.audit.get_project_audit(project.id).await.unwrap();
        let actions_seen: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        for expected in [
            actions::PROJECT_CREATED,
            actions::MILESTONES_CREATED,
            actions::MILESTONE_VERIFIED,
            actions::ESCROW_FUNDED,
            actions::EVIDENCE_ADDED,
            actions::ESCROW_RELEASED,
        ] {
            assert!(actions_seen.contains(&expected), "missing {}", expected);
        }

        let released = trail
            .iter()
            .find(|e| e.action == actions::ESCROW_RELEASED)
            .unwrap();
        assert_eq!(released.actor_id, project.client_id);
        assert_eq!(released.details["company_id"], project.company_id.to_string());
        assert_eq!(released.details["admin_override"], false);
        assert!(released.details["transfer_reference"]
            .as_str()
            .is_some_and(|r| r.starts_with("escrow-release-")));
    }

    #[tokio::test]
    async fn rejected_operations_are_not_audited() {
        let h = Harness::new();
        let (project, milestones) = h.active_project(&["100"]).await;
        let before = h.store.audit_actions().await.len();

        assert!(h.milestones.submit(milestones[0].id, project.company_id).await.is_err());
        assert!(h.escrow.release(milestones[0].id, project.client_id, false, None).await.is_err());

        assert_eq!(h.store.audit_actions().await.len(), before);
    }
}
