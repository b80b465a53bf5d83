// db/memory.rs
//! In-memory `MarketStore` for service tests. Every method holds the single
//! state lock for its whole body, which gives the same all-or-nothing
//! behaviour the Postgres transactions give `DBClient`.
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    auditdb::AuditExt, consultationdb::ConsultationExt, disputedb::DisputeExt,
    escrowdb::EscrowExt, notificationdb::NotificationExt, paymentdb::PaymentAccountExt,
    projectdb::ProjectExt,
};
use crate::models::{
    auditmodel::*, consultationmodel::*, disputemodel::*, escrowmodel::*, paymentmodel::*,
    projectmodel::*,
};

#[derive(Default)]
struct State {
    projects: Vec<Project>,
    milestones: Vec<Milestone>,
    evidence: Vec<MilestoneEvidence>,
    escrows: Vec<Escrow>,
    hold_references: Vec<EscrowHoldReference>,
    disputes: Vec<Dispute>,
    accounts: Vec<PaymentAccount>,
    consultations: Vec<Consultation>,
    audit: Vec<AuditLog>,
    notifications: Vec<Notification>,
    racing_hold_refs: usize,
}

impl State {
    fn open_full_dispute(&self, project_id: Uuid) -> bool {
        self.disputes
            .iter()
            .any(|d| d.project_id == project_id && d.blocks_money_movement())
    }

    fn milestone_mut(&mut self, milestone_id: Uuid) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.id == milestone_id)
    }

    fn predecessor_complete(&self, milestone: &Milestone) -> bool {
        self.milestones
            .iter()
            .filter(|m| m.project_id == milestone.project_id && m.sequence_order < milestone.sequence_order)
            .max_by_key(|m| m.sequence_order)
            .map_or(true, |p| p.status.is_complete())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn escrow_count(&self) -> usize {
        self.state.lock().await.escrows.len()
    }

    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn audit_actions(&self) -> Vec<String> {
        self.state.lock().await.audit.iter().map(|a| a.action.clone()).collect()
    }

    /// Reserves a hold reference so the allocator sees a collision.
    pub async fn seed_hold_reference(&self, hold_ref: &str) {
        let now = Utc::now();
        self.state.lock().await.hold_references.push(EscrowHoldReference {
            id: Uuid::new_v4(),
            hold_ref: hold_ref.to_string(),
            escrow_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            milestone_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            gateway_charge_reference: format!("seed-{hold_ref}"),
            gateway_transfer_reference: None,
            gateway_refund_reference: None,
            status: EscrowStatus::Held,
            created_at: now,
            updated_at: now,
        });
    }

    /// The next `count` escrow writes find their hold reference taken, as if
    /// another confirmation inserted it between allocation and commit.
    pub async fn race_next_hold_refs(&self, count: usize) {
        self.state.lock().await.racing_hold_refs = count;
    }

    /// Forces a milestone status, bypassing every guard.
    pub async fn force_milestone_status(&self, milestone_id: Uuid, status: MilestoneStatus) {
        if let Some(m) = self.state.lock().await.milestone_mut(milestone_id) {
            m.status = status;
        }
    }
}

#[async_trait]
impl ProjectExt for MemoryStore {
    async fn create_project(&self, project: NewProject) -> Result<Project, Error> {
        let now = Utc::now();
        let created = Project {
            id: Uuid::new_v4(),
            client_id: project.client_id,
            company_id: project.company_id,
            consultation_id: project.consultation_id,
            title: project.title,
            description: project.description,
            budget_min: project.budget_min,
            budget_max: project.budget_max,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.projects.push(created.clone());
        Ok(created)
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, Error> {
        Ok(self.state.lock().await.projects.iter().find(|p| p.id == project_id).cloned())
    }

    async fn get_projects_for_user(&self, user_id: Uuid) -> Result<Vec<Project>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .projects
            .iter()
            .filter(|p| p.is_party(user_id))
            .cloned()
            .collect())
    }

    async fn update_project_status(
        &self,
        project_id: Uuid,
        expected: &[ProjectStatus],
        to: ProjectStatus,
    ) -> Result<Option<Project>, Error> {
        let mut state = self.state.lock().await;
        Ok(state
            .projects
            .iter_mut()
            .find(|p| p.id == project_id && expected.contains(&p.status))
            .map(|p| {
                p.status = to;
                p.updated_at = Utc::now();
                p.clone()
            }))
    }

    async fn create_milestones(
        &self,
        project_id: Uuid,
        milestones: Vec<NewMilestone>,
    ) -> Result<Vec<Milestone>, Error> {
        let mut state = self.state.lock().await;
        let taken: Vec<i32> = state
            .milestones
            .iter()
            .filter(|m| m.project_id == project_id)
            .map(|m| m.sequence_order)
            .collect();
        if milestones.iter().any(|m| taken.contains(&m.sequence_order)) {
            return Err(Error::Protocol("duplicate sequence_order".into()));
        }

        let now = Utc::now();
        let mut created: Vec<Milestone> = milestones
            .into_iter()
            .map(|m| Milestone {
                id: Uuid::new_v4(),
                project_id,
                title: m.title,
                description: m.description,
                amount: m.amount,
                sequence_order: m.sequence_order,
                status: MilestoneStatus::Pending,
                verified_at: None,
                verified_by: None,
                client_notes: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        state.milestones.extend(created.iter().cloned());
        created.sort_by_key(|m| m.sequence_order);
        Ok(created)
    }

    async fn get_milestone(&self, milestone_id: Uuid) -> Result<Option<Milestone>, Error> {
        Ok(self.state.lock().await.milestones.iter().find(|m| m.id == milestone_id).cloned())
    }

    async fn get_project_milestones(&self, project_id: Uuid) -> Result<Vec<Milestone>, Error> {
        let mut milestones: Vec<Milestone> = self
            .state
            .lock()
            .await
            .milestones
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        milestones.sort_by_key(|m| m.sequence_order);
        Ok(milestones)
    }

    async fn transition_milestone(
        &self,
        milestone_id: Uuid,
        expected: &[MilestoneStatus],
        to: MilestoneStatus,
        dispute_gated: bool,
    ) -> Result<Option<Milestone>, Error> {
        let mut state = self.state.lock().await;
        let Some(project_id) = state
            .milestones
            .iter()
            .find(|m| m.id == milestone_id)
            .map(|m| m.project_id)
        else {
            return Ok(None);
        };
        if dispute_gated && state.open_full_dispute(project_id) {
            return Ok(None);
        }
        Ok(state
            .milestone_mut(milestone_id)
            .filter(|m| expected.contains(&m.status))
            .map(|m| {
                m.status = to;
                m.updated_at = Utc::now();
                m.clone()
            }))
    }

    async fn verify_milestone(
        &self,
        milestone_id: Uuid,
        verified_by: Uuid,
        notes: Option<String>,
    ) -> Result<Option<MilestoneVerification>, Error> {
        let mut state = self.state.lock().await;
        let project_id = state
            .milestones
            .iter()
            .find(|m| m.id == milestone_id)
            .map(|m| m.project_id)
            .ok_or(Error::RowNotFound)?;
        let project = state
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .cloned()
            .ok_or(Error::RowNotFound)?;
        if project.status != ProjectStatus::Draft {
            return Ok(None);
        }

        let now = Utc::now();
        let milestone = {
            let m = state.milestone_mut(milestone_id).ok_or(Error::RowNotFound)?;
            m.verified_at = Some(now);
            m.verified_by = Some(verified_by);
            if notes.is_some() {
                m.client_notes = notes;
            }
            m.updated_at = now;
            m.clone()
        };

        let all_verified = state
            .milestones
            .iter()
            .filter(|m| m.project_id == project_id)
            .all(|m| m.verified_at.is_some());

        let project = if all_verified {
            let p = state
                .projects
                .iter_mut()
                .find(|p| p.id == project_id)
                .ok_or(Error::RowNotFound)?;
            p.status = ProjectStatus::Active;
            p.updated_at = now;
            p.clone()
        } else {
            project
        };

        Ok(Some(MilestoneVerification {
            milestone,
            project,
            project_activated: all_verified,
        }))
    }

    async fn add_evidence(&self, evidence: NewEvidence) -> Result<MilestoneEvidence, Error> {
        let created = MilestoneEvidence {
            id: Uuid::new_v4(),
            milestone_id: evidence.milestone_id,
            uploaded_by: evidence.uploaded_by,
            file_url: evidence.file.url,
            thumbnail_url: evidence.file.thumbnail_url,
            width: evidence.file.width,
            height: evidence.file.height,
            format: evidence.file.format,
            bytes: evidence.file.bytes,
            description: evidence.description,
            created_at: Utc::now(),
        };
        self.state.lock().await.evidence.push(created.clone());
        Ok(created)
    }

    async fn get_milestone_evidence(&self, milestone_id: Uuid) -> Result<Vec<MilestoneEvidence>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .evidence
            .iter()
            .filter(|e| e.milestone_id == milestone_id)
            .cloned()
            .collect())
    }

    async fn count_milestone_evidence(&self, milestone_id: Uuid) -> Result<i64, Error> {
        Ok(self
            .state
            .lock()
            .await
            .evidence
            .iter()
            .filter(|e| e.milestone_id == milestone_id)
            .count() as i64)
    }
}

#[async_trait]
impl EscrowExt for MemoryStore {
    async fn get_escrow_by_milestone(&self, milestone_id: Uuid) -> Result<Option<Escrow>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .escrows
            .iter()
            .find(|e| e.milestone_id == milestone_id)
            .cloned())
    }

    async fn get_escrow_by_payment_reference(&self, reference: &str) -> Result<Option<Escrow>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .escrows
            .iter()
            .find(|e| e.payment_reference == reference)
            .cloned())
    }

    async fn get_hold_reference(&self, escrow_id: Uuid) -> Result<Option<EscrowHoldReference>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .hold_references
            .iter()
            .find(|h| h.escrow_id == escrow_id)
            .cloned())
    }

    async fn hold_reference_exists(&self, hold_ref: &str) -> Result<bool, Error> {
        Ok(self
            .state
            .lock()
            .await
            .hold_references
            .iter()
            .any(|h| h.hold_ref == hold_ref))
    }

    async fn record_funded_escrow(
        &self,
        escrow: NewEscrow,
        hold_ref: String,
    ) -> Result<FundingRecord, Error> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state
            .escrows
            .iter()
            .find(|e| e.payment_reference == escrow.payment_reference)
        {
            return Ok(FundingRecord::AlreadyRecorded(existing.clone()));
        }
        let Some(current) = state.milestones.iter().find(|m| m.id == escrow.milestone_id).cloned() else {
            return Ok(FundingRecord::Stale);
        };
        // Mirrors the guarded UPDATE in `EscrowExt for DBClient`.
        let fundable = matches!(current.status, MilestoneStatus::Pending | MilestoneStatus::Funded)
            && !state.open_full_dispute(current.project_id)
            && state.predecessor_complete(&current)
            && !state.escrows.iter().any(|e| e.milestone_id == current.id);
        if !fundable {
            return Ok(FundingRecord::Stale);
        }
        if state.racing_hold_refs > 0 {
            state.racing_hold_refs -= 1;
            return Ok(FundingRecord::HoldRefTaken);
        }
        if state.hold_references.iter().any(|h| h.hold_ref == hold_ref) {
            return Ok(FundingRecord::HoldRefTaken);
        }

        let now = Utc::now();
        let milestone = {
            let m = state.milestone_mut(escrow.milestone_id).ok_or(Error::RowNotFound)?;
            m.status = MilestoneStatus::Funded;
            m.updated_at = now;
            m.clone()
        };

        let created = Escrow {
            id: Uuid::new_v4(),
            milestone_id: escrow.milestone_id,
            project_id: escrow.project_id,
            client_id: escrow.client_id,
            company_id: escrow.company_id,
            amount: escrow.amount,
            platform_fee: escrow.platform_fee,
            net_amount: escrow.net_amount,
            payment_reference: escrow.payment_reference,
            payment_provider: escrow.payment_provider,
            status: EscrowStatus::Held,
            created_at: now,
            released_at: None,
            refunded_at: None,
        };
        let hold_reference = EscrowHoldReference {
            id: Uuid::new_v4(),
            hold_ref,
            escrow_id: created.id,
            project_id: created.project_id,
            milestone_id: created.milestone_id,
            client_id: created.client_id,
            company_id: created.company_id,
            gateway_charge_reference: created.payment_reference.clone(),
            gateway_transfer_reference: None,
            gateway_refund_reference: None,
            status: EscrowStatus::Held,
            created_at: now,
            updated_at: now,
        };
        state.escrows.push(created.clone());
        state.hold_references.push(hold_reference.clone());

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
        let mut state = self.state.lock().await;

        let Some(escrow) = state
            .escrows
            .iter()
            .find(|e| e.id == escrow_id && e.status == EscrowStatus::Held)
            .cloned()
        else {
            return Ok(None);
        };
        let milestone_ok = state
            .milestones
            .iter()
            .find(|m| m.id == escrow.milestone_id)
            .map_or(false, |m| {
                m.status == MilestoneStatus::Approved
                    || (admin_override && m.status != MilestoneStatus::Released)
            });
        if !milestone_ok {
            return Ok(None);
        }

        let now = Utc::now();
        let escrow = {
            let e = state.escrows.iter_mut().find(|e| e.id == escrow_id).ok_or(Error::RowNotFound)?;
            e.status = EscrowStatus::Released;
            e.released_at = Some(now);
            e.clone()
        };
        let milestone = {
            let m = state.milestone_mut(escrow.milestone_id).ok_or(Error::RowNotFound)?;
            m.status = MilestoneStatus::Released;
            m.updated_at = now;
            m.clone()
        };
        let hold_reference = state
            .hold_references
            .iter_mut()
            .find(|h| h.escrow_id == escrow_id)
            .map(|h| {
                h.status = EscrowStatus::Released;
                h.gateway_transfer_reference = Some(transfer_reference);
                h.updated_at = now;
                h.clone()
            });

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
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let Some(escrow) = state
            .escrows
            .iter_mut()
            .find(|e| e.id == escrow_id && e.status == EscrowStatus::Held)
            .map(|e| {
                e.status = EscrowStatus::Refunded;
                e.refunded_at = Some(now);
                e.clone()
            })
        else {
            return Ok(None);
        };
        let hold_reference = state
            .hold_references
            .iter_mut()
            .find(|h| h.escrow_id == escrow_id)
            .map(|h| {
                h.status = EscrowStatus::Refunded;
                h.gateway_refund_reference = Some(refund_reference);
                h.updated_at = now;
                h.clone()
            });
        let milestone = state
            .milestones
            .iter()
            .find(|m| m.id == escrow.milestone_id)
            .cloned()
            .ok_or(Error::RowNotFound)?;

        Ok(Some(SettledEscrow {
            escrow,
            hold_reference,
            milestone,
        }))
    }
}

#[async_trait]
impl DisputeExt for MemoryStore {
    async fn open_dispute(&self, dispute: NewDispute) -> Result<(Dispute, Option<Project>), Error> {
        let mut state = self.state.lock().await;
        let created = Dispute {
            id: Uuid::new_v4(),
            project_id: dispute.project_id,
            milestone_id: dispute.milestone_id,
            dispute_type: dispute.dispute_type,
            raised_by: dispute.raised_by,
            reason: dispute.reason,
            status: DisputeStatus::Open,
            resolution: None,
            resolved_by: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        state.disputes.push(created.clone());

        let project = if created.dispute_type == DisputeType::Dispute {
            state
                .projects
                .iter_mut()
                .find(|p| {
                    p.id == created.project_id
                        && matches!(p.status, ProjectStatus::Draft | ProjectStatus::Active)
                })
                .map(|p| {
                    p.status = ProjectStatus::Disputed;
                    p.updated_at = Utc::now();
                    p.clone()
                })
        } else {
            None
        };
        Ok((created, project))
    }

    async fn reject_milestone(
        &self,
        milestone_id: Uuid,
        revision: NewDispute,
    ) -> Result<Option<(Milestone, Dispute)>, Error> {
        let mut state = self.state.lock().await;
        let Some(milestone) = state
            .milestone_mut(milestone_id)
            .filter(|m| m.status == MilestoneStatus::Submitted)
            .map(|m| {
                m.status = MilestoneStatus::Rejected;
                m.updated_at = Utc::now();
                m.clone()
            })
        else {
            return Ok(None);
        };

        let dispute = Dispute {
            id: Uuid::new_v4(),
            project_id: revision.project_id,
            milestone_id: Some(milestone_id),
            dispute_type: DisputeType::RevisionRequest,
            raised_by: revision.raised_by,
            reason: revision.reason,
            status: DisputeStatus::Open,
            resolution: None,
            resolved_by: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        state.disputes.push(dispute.clone());
        Ok(Some((milestone, dispute)))
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, Error> {
        Ok(self.state.lock().await.disputes.iter().find(|d| d.id == dispute_id).cloned())
    }

    async fn get_project_disputes(&self, project_id: Uuid) -> Result<Vec<Dispute>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .disputes
            .iter()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn has_active_full_dispute(&self, project_id: Uuid) -> Result<bool, Error> {
        Ok(self.state.lock().await.open_full_dispute(project_id))
    }

    async fn close_dispute(
        &self,
        dispute_id: Uuid,
        to: DisputeStatus,
        resolution: String,
        resolved_by: Uuid,
    ) -> Result<Option<Dispute>, Error> {
        let mut state = self.state.lock().await;
        Ok(state
            .disputes
            .iter_mut()
            .find(|d| d.id == dispute_id && d.status == DisputeStatus::Open)
            .map(|d| {
                d.status = to;
                d.resolution = Some(resolution);
                d.resolved_by = Some(resolved_by);
                d.resolved_at = Some(Utc::now());
                d.clone()
            }))
    }

    async fn resolve_revision_requests(
        &self,
        milestone_id: Uuid,
        resolved_by: Uuid,
        resolution: String,
    ) -> Result<u64, Error> {
        let mut state = self.state.lock().await;
        let mut closed = 0;
        for d in state.disputes.iter_mut().filter(|d| {
            d.milestone_id == Some(milestone_id)
                && d.dispute_type == DisputeType::RevisionRequest
                && d.status == DisputeStatus::Open
        }) {
            d.status = DisputeStatus::Resolved;
            d.resolution = Some(resolution.clone());
            d.resolved_by = Some(resolved_by);
            d.resolved_at = Some(Utc::now());
            closed += 1;
        }
        Ok(closed)
    }
}

#[async_trait]
impl PaymentAccountExt for MemoryStore {
    async fn add_payment_account(
        &self,
        account: NewPaymentAccount,
        make_default: bool,
    ) -> Result<PaymentAccount, Error> {
        let mut state = self.state.lock().await;
        let has_default = state
            .accounts
            .iter()
            .any(|a| a.user_id == account.user_id && a.is_default);
        let is_default = make_default || !has_default;
        if is_default {
            for a in state.accounts.iter_mut().filter(|a| a.user_id == account.user_id) {
                a.is_default = false;
            }
        }
        let created = PaymentAccount {
            id: Uuid::new_v4(),
            user_id: account.user_id,
            bank_code: account.bank_code,
            bank_name: account.bank_name,
            account_number: account.account_number,
            account_name: account.account_name,
            is_default,
            created_at: Utc::now(),
        };
        state.accounts.push(created.clone());
        Ok(created)
    }

    async fn set_default_payment_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<PaymentAccount>, Error> {
        let mut state = self.state.lock().await;
        if !state.accounts.iter().any(|a| a.id == account_id && a.user_id == user_id) {
            return Ok(None);
        }
        let mut selected = None;
        for a in state.accounts.iter_mut().filter(|a| a.user_id == user_id) {
            a.is_default = a.id == account_id;
            if a.is_default {
                selected = Some(a.clone());
            }
        }
        Ok(selected)
    }

    async fn get_payment_account(&self, account_id: Uuid) -> Result<Option<PaymentAccount>, Error> {
        Ok(self.state.lock().await.accounts.iter().find(|a| a.id == account_id).cloned())
    }

    async fn get_default_payment_account(&self, user_id: Uuid) -> Result<Option<PaymentAccount>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.user_id == user_id && a.is_default)
            .cloned())
    }

    async fn get_payment_accounts(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConsultationExt for MemoryStore {
    async fn create_consultation(&self, consultation: NewConsultation) -> Result<Consultation, Error> {
        let created = Consultation {
            id: Uuid::new_v4(),
            client_id: consultation.client_id,
            company_id: consultation.company_id,
            fee: consultation.fee,
            topic: consultation.topic,
            scheduled_for: consultation.scheduled_for,
            status: ConsultationStatus::PendingPayment,
            payment_reference: Some(consultation.payment_reference),
            paid_at: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.consultations.push(created.clone());
        Ok(created)
    }

    async fn get_consultation(&self, consultation_id: Uuid) -> Result<Option<Consultation>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .consultations
            .iter()
            .find(|c| c.id == consultation_id)
            .cloned())
    }

    async fn get_consultation_by_reference(&self, reference: &str) -> Result<Option<Consultation>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .consultations
            .iter()
            .find(|c| c.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn confirm_consultation_payment(&self, reference: &str) -> Result<Option<ConsultationPayment>, Error> {
        let mut state = self.state.lock().await;
        let Some(c) = state
            .consultations
            .iter_mut()
            .find(|c| c.payment_reference.as_deref() == Some(reference))
        else {
            return Ok(None);
        };
        if c.status == ConsultationStatus::PendingPayment {
            c.status = ConsultationStatus::Scheduled;
            c.paid_at = Some(Utc::now());
            return Ok(Some(ConsultationPayment::Confirmed(c.clone())));
        }
        Ok(c.paid_at.map(|_| ConsultationPayment::AlreadyConfirmed(c.clone())))
    }

    async fn update_consultation_status(
        &self,
        consultation_id: Uuid,
        expected: &[ConsultationStatus],
        to: ConsultationStatus,
    ) -> Result<Option<Consultation>, Error> {
        let mut state = self.state.lock().await;
        Ok(state
            .consultations
            .iter_mut()
            .find(|c| c.id == consultation_id && expected.contains(&c.status))
            .map(|c| {
                c.status = to;
                c.clone()
            }))
    }
}

#[async_trait]
impl AuditExt for MemoryStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLog, Error> {
        let created = AuditLog {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action,
            project_id: entry.project_id,
            milestone_id: entry.milestone_id,
            escrow_id: entry.escrow_id,
            details: entry.details,
            description: entry.description,
            created_at: Utc::now(),
        };
        self.state.lock().await.audit.push(created.clone());
        Ok(created)
    }

    async fn get_project_audit(&self, project_id: Uuid) -> Result<Vec<AuditLog>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .audit
            .iter()
            .filter(|a| a.project_id == Some(project_id))
            .cloned()
            .collect())
    }

    async fn get_escrow_audit_for_party(&self, user_id: Uuid) -> Result<Vec<AuditLog>, Error> {
        let id = user_id.to_string();
        Ok(self
            .state
            .lock()
            .await
            .audit
            .iter()
            .filter(|a| a.escrow_id.is_some())
            .filter(|a| {
                a.details.get("client_id").and_then(|v| v.as_str()) == Some(id.as_str())
                    || a.details.get("company_id").and_then(|v| v.as_str()) == Some(id.as_str())
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationExt for MemoryStore {
    async fn store_notification(
        &self,
        user_id: Uuid,
        template: &str,
        payload: serde_json::Value,
    ) -> Result<Notification, Error> {
        let created = Notification {
            id: Uuid::new_v4(),
            user_id,
            template: template.to_string(),
            payload,
            created_at: Utc::now(),
        };
        self.state.lock().await.notifications.push(created.clone());
        Ok(created)
    }
}
