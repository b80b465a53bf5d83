// service/notification_service.rs
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        consultationmodel::Consultation,
        disputemodel::Dispute,
        escrowmodel::Escrow,
        projectmodel::{Milestone, Project},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    ConsultationScheduled,
    ProjectActivated,
    ProjectCompleted,
    MilestoneFunded,
    MilestoneSubmitted,
    MilestoneApproved,
    MilestoneRejected,
    PaymentReleased,
    EscrowRefunded,
    DisputeRaised,
    DisputeClosed,
}

impl NotificationTemplate {
    pub fn to_str(&self) -> &'static str {
        match self {
            NotificationTemplate::ConsultationScheduled => "consultation_scheduled",
            NotificationTemplate::ProjectActivated => "project_activated",
            NotificationTemplate::ProjectCompleted => "project_completed",
            NotificationTemplate::MilestoneFunded => "milestone_funded",
            NotificationTemplate::MilestoneSubmitted => "milestone_submitted",
            NotificationTemplate::MilestoneApproved => "milestone_approved",
            NotificationTemplate::MilestoneRejected => "milestone_rejected",
            NotificationTemplate::PaymentReleased => "payment_released",
            NotificationTemplate::EscrowRefunded => "escrow_refunded",
            NotificationTemplate::DisputeRaised => "dispute_raised",
            NotificationTemplate::DisputeClosed => "dispute_closed",
        }
    }
}

/// Fire-and-forget sink. Delivery runs on a spawned task so a slow or failing
/// sink never holds up the transition that triggered it.
pub struct NotificationService {
    db: Arc<dyn MarketStore>,
}

impl NotificationService {
    pub fn new(db: Arc<dyn MarketStore>) -> Self {
        Self { db }
    }

    pub fn notify(&self, user_id: Uuid, template: NotificationTemplate, payload: serde_json::Value) {
        let db = self.db.clone();
        tokio::spawn(async move {
            tracing::info!("Notification {} for user {}", template.to_str(), user_id);
            if let Err(e) = db.store_notification(user_id, template.to_str(), payload).await {
                tracing::warn!(
                    "Failed to deliver {} notification to {}: {}",
                    template.to_str(),
                    user_id,
                    e
                );
            }
        });
    }

    pub fn notify_consultation_scheduled(&self, consultation: &Consultation) {
        let payload = json!({
            "consultation_id": consultation.id,
            "topic": consultation.topic,
            "scheduled_for": consultation.scheduled_for,
        });
        self.notify(consultation.company_id, NotificationTemplate::ConsultationScheduled, payload.clone());
        self.notify(consultation.client_id, NotificationTemplate::ConsultationScheduled, payload);
    }

    pub fn notify_project_parties(&self, project: &Project, template: NotificationTemplate) {
        let payload = json!({
            "project_id": project.id,
            "title": project.title,
            "status": project.status.to_str(),
        });
        self.notify(project.client_id, template, payload.clone());
        self.notify(project.company_id, template, payload);
    }

    pub fn notify_milestone(&self, recipient: Uuid, milestone: &Milestone, template: NotificationTemplate) {
        self.notify(
            recipient,
            template,
            json!({
                "project_id": milestone.project_id,
                "milestone_id": milestone.id,
                "title": milestone.title,
                "amount": milestone.amount,
                "status": milestone.status.to_str(),
            }),
        );
    }

    pub fn notify_escrow(&self, recipient: Uuid, escrow: &Escrow, hold_ref: Option<&str>, template: NotificationTemplate) {
        self.notify(
            recipient,
            template,
            json!({
                "escrow_id": escrow.id,
                "milestone_id": escrow.milestone_id,
                "amount": escrow.amount,
                "net_amount": escrow.net_amount,
                "hold_ref": hold_ref,
            }),
        );
    }

    pub fn notify_dispute(&self, recipient: Uuid, dispute: &Dispute, template: NotificationTemplate) {
        self.notify(
            recipient,
            template,
            json!({
                "dispute_id": dispute.id,
                "project_id": dispute.project_id,
                "milestone_id": dispute.milestone_id,
                "dispute_type": dispute.dispute_type.to_str(),
                "status": dispute.status.to_str(),
                "reason": dispute.reason,
            }),
        );
    }
}
