// service/escrow_service.rs
use std::{collections::HashMap, sync::Arc};

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    config::Config,
    db::db::MarketStore,
    models::{
        escrowmodel::*,
        paymentmodel::PaymentPurpose,
        projectmodel::{Milestone, MilestoneStatus, Project, ProjectStatus},
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        milestone_machine::{
            ensure_fundable, ensure_markable, ensure_refundable, ensure_releasable, release_transfer_reference,
        },
        notification_service::{NotificationService, NotificationTemplate},
        payment_provider::{ChargeStatus, PaymentGateway, PaymentProviderError, PaymentVerification, PayoutRecipient},
        project_service::ProjectService,
    },
    utils::{
        currency::split_platform_fee,
        hold_ref::{fallback_hold_ref, generate_hold_ref, MAX_HOLD_REF_ATTEMPTS},
    },
};

#[derive(Debug, Clone)]
pub struct EscrowSettings {
    pub currency: String,
    pub platform_fee_percent: BigDecimal,
}

impl EscrowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            currency: config.payment_currency.clone(),
            platform_fee_percent: config.platform_fee_percent.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FundingInitialization {
    pub milestone_id: Uuid,
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
    pub amount: BigDecimal,
}

pub struct EscrowService {
    db: Arc<dyn MarketStore>,
    gateway: Arc<dyn PaymentGateway>,
    projects: Arc<ProjectService>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
    settings: EscrowSettings,
    // Money-moving operations on one milestone run one at a time per process.
    milestone_locks: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl EscrowService {
    pub fn new(
        db: Arc<dyn MarketStore>,
        gateway: Arc<dyn PaymentGateway>,
        projects: Arc<ProjectService>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
        settings: EscrowSettings,
    ) -> Self {
        Self {
            db,
            gateway,
            projects,
            audit,
            notifications,
            settings,
            milestone_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get_escrow_for_milestone(&self, milestone_id: Uuid) -> Result<Escrow, ServiceError> {
        self.db
            .get_escrow_by_milestone(milestone_id)
            .await?
            .ok_or(ServiceError::EscrowNotFound(milestone_id))
    }

    pub async fn get_hold_reference(&self, escrow_id: Uuid) -> Result<Option<EscrowHoldReference>, ServiceError> {
        Ok(self.db.get_hold_reference(escrow_id).await?)
    }

    /// Company-initiated "ready for funding" signal. No money moves.
    pub async fn mark_funded(&self, milestone_id: Uuid, actor_id: Uuid) -> Result<Milestone, ServiceError> {
        let (milestone, project) = self.check_fundable(milestone_id, true).await?;
        let from = milestone.status;

        let funded = self
            .db
            .transition_milestone(milestone_id, &[from], MilestoneStatus::Funded, true)
            .await?;
        let funded = match funded {
            Some(m) => m,
            None => {
                // Re-run the guards so the caller gets the precise reason.
                self.check_fundable(milestone_id, true).await?;
                return Err(ServiceError::ConcurrentModification { entity: "milestone", id: milestone_id });
            }
        };

        tracing::info!("Milestone {} marked funded by {}", milestone_id, actor_id);
        self.audit
            .log_milestone_transition(actor_id, &funded, from, serde_json::json!({ "path": "direct" }))
            .await;
        self.notifications
            .notify_milestone(project.client_id, &funded, NotificationTemplate::MilestoneFunded);
        Ok(funded)
    }

    /// Opens a gateway charge for the milestone amount. Nothing is persisted
    /// until the payment is confirmed.
    pub async fn initialize_funding(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        email: &str,
    ) -> Result<FundingInitialization, ServiceError> {
        let (milestone, project) = self.check_fundable(milestone_id, false).await?;
        if project.client_id != actor_id {
            return Err(ServiceError::NotProjectParty(actor_id, project.id));
        }

        let reference = format!("MSE-{}", Uuid::new_v4().simple());
        let metadata = serde_json::json!({
            "type": PaymentPurpose::MilestoneEscrow.to_str(),
            "milestone_id": milestone.id,
            "project_id": project.id,
            "client_id": project.client_id,
        });

        let init = self
            .gateway
            .initialize_payment(&milestone.amount, &self.settings.currency, email, &reference, metadata)
            .await
            .map_err(|e| {
                tracing::error!("Failed to initialize funding for milestone {}: {}", milestone_id, e);
                e
            })?;

        tracing::info!("Funding initialized for milestone {} with reference {}", milestone_id, init.reference);
        Ok(FundingInitialization {
            milestone_id,
            reference: init.reference,
            authorization_url: init.authorization_url,
            access_code: init.access_code,
            amount: milestone.amount,
        })
    }

    /// Verifies the charge with the gateway and records the escrow. A reference
    /// that is already recorded returns its escrow without calling the gateway.
    pub async fn confirm_funding(&self, reference: &str) -> Result<Escrow, ServiceError> {
        if let Some(existing) = self.db.get_escrow_by_payment_reference(reference).await? {
            return Ok(existing);
        }

        let verification = self.gateway.verify_payment(reference).await.map_err(|e| {
            tracing::error!("Failed to verify funding payment {}: {}", reference, e);
            e
        })?;
        self.apply_verified_funding(&verification).await
    }

    /// Records a verified charge: Escrow(held) + hold reference + milestone
    /// funded in one write. The payer is the project's client.
    pub async fn apply_verified_funding(&self, verification: &PaymentVerification) -> Result<Escrow, ServiceError> {
        let reference = verification.reference.as_str();

        if let Some(existing) = self.db.get_escrow_by_payment_reference(reference).await? {
            return Ok(existing);
        }
        if verification.status != ChargeStatus::Success {
            return Err(PaymentProviderError::NotSuccessful {
                reference: reference.to_string(),
                status: format!("{:?}", verification.status).to_lowercase(),
            }
            .into());
        }

        let milestone_id = verification
            .metadata
            .get("milestone_id")
            .and_then(|v| v.as_str())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| ServiceError::Validation(format!("Payment {} carries no milestone_id", reference)))?;

        let lock = self.milestone_lock(milestone_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.record_funding(milestone_id, verification).await
        };
        drop(lock);
        self.evict_idle_lock(milestone_id).await;
        result
    }

    async fn record_funding(
        &self,
        milestone_id: Uuid,
        verification: &PaymentVerification,
    ) -> Result<Escrow, ServiceError> {
        let reference = verification.reference.as_str();
        if let Some(existing) = self.db.get_escrow_by_payment_reference(reference).await? {
            return Ok(existing);
        }

        let (milestone, project) = match self.check_fundable(milestone_id, false).await {
            Ok(checked) => checked,
            Err(e) => {
                // Another process may have recorded this reference meanwhile.
                if let Some(existing) = self.db.get_escrow_by_payment_reference(reference).await? {
                    return Ok(existing);
                }
                tracing::error!(
                    "Captured payment {} cannot fund milestone {}: {}. Manual refund review required",
                    reference,
                    milestone_id,
                    e
                );
                return Err(e);
            }
        };

        if verification.amount < milestone.amount {
            tracing::error!(
                "Payment {} amount {} is below milestone {} amount {}",
                reference,
                verification.amount,
                milestone_id,
                milestone.amount
            );
            return Err(ServiceError::AmountMismatch {
                reference: reference.to_string(),
                expected: milestone.amount.clone(),
                paid: verification.amount.clone(),
            });
        }

        let (platform_fee, net_amount) =
            split_platform_fee(&milestone.amount, &self.settings.platform_fee_percent);
        let new_escrow = NewEscrow {
            milestone_id,
            project_id: project.id,
            client_id: project.client_id,
            company_id: project.company_id,
            amount: milestone.amount.clone(),
            platform_fee,
            net_amount,
            payment_reference: reference.to_string(),
            payment_provider: self.gateway.provider_name().to_string(),
        };

        // The allocator's existence check runs outside the write, so a racing
        // escrow can still take the reference before commit.
        let mut record = FundingRecord::HoldRefTaken;
        for _ in 0..MAX_HOLD_REF_ATTEMPTS {
            let hold_ref = self.allocate_hold_ref().await?;
            record = self.db.record_funded_escrow(new_escrow.clone(), hold_ref).await?;
            if !matches!(record, FundingRecord::HoldRefTaken) {
                break;
            }
            tracing::warn!("Hold reference taken while recording payment {}, retrying", reference);
        }

        match record {
            FundingRecord::Created { escrow, hold_reference, milestone: funded } => {
                tracing::info!(
                    "Escrow {} ({}) held for milestone {}",
                    escrow.id,
                    hold_reference.hold_ref,
                    milestone_id
                );
                self.audit.log_escrow_funded(project.client_id, &escrow, &hold_reference).await;
                self.audit
                    .log_milestone_transition(
                        project.client_id,
                        &funded,
                        milestone.status,
                        serde_json::json!({ "path": "payment", "payment_reference": reference }),
                    )
                    .await;
                self.notifications.notify_escrow(
                    project.company_id,
                    &escrow,
                    Some(&hold_reference.hold_ref),
                    NotificationTemplate::MilestoneFunded,
                );
                Ok(escrow)
            }
            FundingRecord::AlreadyRecorded(escrow) => Ok(escrow),
            FundingRecord::HoldRefTaken => {
                tracing::error!(
                    "No free hold reference for payment {} on milestone {}. Manual review required",
                    reference,
                    milestone_id
                );
                Err(ServiceError::ConcurrentModification { entity: "escrow hold reference", id: milestone_id })
            }
            FundingRecord::Stale => {
                self.check_fundable(milestone_id, false).await?;
                Err(ServiceError::ConcurrentModification { entity: "milestone", id: milestone_id })
            }
        }
    }

    /// Pays the company's net share out of a held escrow. `admin_override`
    /// must only be set for an authorized admin; it waives the approval
    /// requirement, not the held escrow.
    pub async fn release(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        admin_override: bool,
        payment_account_id: Option<Uuid>,
    ) -> Result<SettledEscrow, ServiceError> {
        let lock = self.milestone_lock(milestone_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.release_locked(milestone_id, actor_id, admin_override, payment_account_id)
                .await
        };
        drop(lock);
        self.evict_idle_lock(milestone_id).await;

        let settled = result?;
        if let Err(e) = self.projects.evaluate_completion(settled.escrow.project_id, actor_id).await {
            tracing::warn!(
                "Completion check after releasing milestone {} failed: {}",
                milestone_id,
                e
            );
        }
        Ok(settled)
    }

    async fn release_locked(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        admin_override: bool,
        payment_account_id: Option<Uuid>,
    ) -> Result<SettledEscrow, ServiceError> {
        let milestone = self.load_milestone(milestone_id).await?;
        let escrow = self.get_escrow_for_milestone(milestone_id).await?;
        ensure_releasable(&milestone, &escrow, admin_override)?;

        let recipient = self.payout_recipient(escrow.company_id, payment_account_id).await?;
        let transfer_reference = release_transfer_reference(escrow.id);

        let transfer = self
            .gateway
            .release_funds(&transfer_reference, &recipient, &escrow.net_amount)
            .await
            .map_err(|e| {
                tracing::error!("Payout for escrow {} failed: {}", escrow.id, e);
                e
            })?;

        let settled = self
            .db
            .release_escrow(escrow.id, admin_override, transfer.transfer_reference.clone())
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    "Escrow {} paid out with transfer {} but its state changed concurrently",
                    escrow.id,
                    transfer.transfer_reference
                );
                ServiceError::ConcurrentModification { entity: "escrow", id: escrow.id }
            })?;

        let hold_ref = settled.hold_reference.as_ref().map(|h| h.hold_ref.as_str());
        tracing::info!(
            "Escrow {} released for milestone {} (override: {})",
            escrow.id,
            milestone_id,
            admin_override
        );
        self.audit
            .log_escrow_released(actor_id, &settled.escrow, hold_ref, &transfer.transfer_reference, admin_override)
            .await;
        self.audit
            .log_milestone_transition(
                actor_id,
                &settled.milestone,
                milestone.status,
                serde_json::json!({ "escrow_id": escrow.id, "admin_override": admin_override }),
            )
            .await;
        self.notifications
            .notify_escrow(settled.escrow.company_id, &settled.escrow, hold_ref, NotificationTemplate::PaymentReleased);
        self.notifications
            .notify_escrow(settled.escrow.client_id, &settled.escrow, hold_ref, NotificationTemplate::PaymentReleased);

        Ok(settled)
    }

    /// Returns a held escrow to the client. The milestone status is untouched.
    pub async fn refund(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        reason: &str,
    ) -> Result<SettledEscrow, ServiceError> {
        let lock = self.milestone_lock(milestone_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.refund_locked(milestone_id, actor_id, reason).await
        };
        drop(lock);
        self.evict_idle_lock(milestone_id).await;
        result
    }

    async fn refund_locked(
        &self,
        milestone_id: Uuid,
        actor_id: Uuid,
        reason: &str,
    ) -> Result<SettledEscrow, ServiceError> {
        let escrow = self.get_escrow_for_milestone(milestone_id).await?;
        ensure_refundable(&escrow)?;

        let refund = self
            .gateway
            .refund_payment(&escrow.payment_reference)
            .await
            .map_err(|e| {
                tracing::error!("Refund for escrow {} failed: {}", escrow.id, e);
                e
            })?;

        let settled = self
            .db
            .refund_escrow(escrow.id, refund.refund_reference.clone())
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    "Escrow {} refunded with {} but its state changed concurrently",
                    escrow.id,
                    refund.refund_reference
                );
                ServiceError::ConcurrentModification { entity: "escrow", id: escrow.id }
            })?;

        let hold_ref = settled.hold_reference.as_ref().map(|h| h.hold_ref.as_str());
        tracing::info!("Escrow {} refunded: {}", escrow.id, reason);
        self.audit
            .log_escrow_refunded(actor_id, &settled.escrow, hold_ref, &refund.refund_reference, reason)
            .await;
        self.notifications
            .notify_escrow(settled.escrow.client_id, &settled.escrow, hold_ref, NotificationTemplate::EscrowRefunded);
        self.notifications
            .notify_escrow(settled.escrow.company_id, &settled.escrow, hold_ref, NotificationTemplate::EscrowRefunded);

        Ok(settled)
    }

    /// Fresh read of every funding guard. `direct` applies the stricter
    /// mark-funded guard instead of the payment one.
    async fn check_fundable(&self, milestone_id: Uuid, direct: bool) -> Result<(Milestone, Project), ServiceError> {
        let milestone = self.load_milestone(milestone_id).await?;
        let project = self
            .db
            .get_project(milestone.project_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound(milestone.project_id))?;
        let siblings = self.db.get_project_milestones(project.id).await?;
        let escrow = self.db.get_escrow_by_milestone(milestone_id).await?;
        let active_dispute = self.db.has_active_full_dispute(project.id).await?;

        if direct {
            ensure_markable(&milestone, &siblings, escrow.as_ref(), active_dispute)?;
        } else {
            ensure_fundable(&milestone, &siblings, escrow.as_ref(), active_dispute)?;
        }

        if project.status != ProjectStatus::Active {
            return Err(ServiceError::InvalidProjectStatus {
                project_id: project.id,
                status: project.status,
                required: "active",
            });
        }
        Ok((milestone, project))
    }

    async fn load_milestone(&self, milestone_id: Uuid) -> Result<Milestone, ServiceError> {
        self.db
            .get_milestone(milestone_id)
            .await?
            .ok_or(ServiceError::MilestoneNotFound(milestone_id))
    }

    async fn payout_recipient(
        &self,
        company_id: Uuid,
        payment_account_id: Option<Uuid>,
    ) -> Result<PayoutRecipient, ServiceError> {
        let account = match payment_account_id {
            Some(account_id) => self
                .db
                .get_payment_account(account_id)
                .await?
                .filter(|a| a.user_id == company_id)
                .ok_or(ServiceError::PaymentAccountNotFound(account_id))?,
            None => self
                .db
                .get_default_payment_account(company_id)
                .await?
                .ok_or(ServiceError::NoPayoutAccount(company_id))?,
        };

        Ok(PayoutRecipient {
            account_name: account.account_name,
            account_number: account.account_number,
            bank_code: account.bank_code,
        })
    }

    /// Random `EHR-` candidates until one is free; after the last attempt the
    /// unix-time suffix makes the value unique.
    async fn allocate_hold_ref(&self) -> Result<String, ServiceError> {
        let mut candidate = generate_hold_ref();
        for _ in 0..MAX_HOLD_REF_ATTEMPTS {
            if !self.db.hold_reference_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!("Hold reference {} already taken", candidate);
            candidate = generate_hold_ref();
        }
        let fallback = fallback_hold_ref(&candidate, Utc::now().timestamp());
        tracing::warn!("Hold reference retries exhausted, using {}", fallback);
        Ok(fallback)
    }

    async fn milestone_lock(&self, milestone_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.milestone_locks.write().await;
        locks
            .entry(milestone_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn evict_idle_lock(&self, milestone_id: Uuid) {
        let mut locks = self.milestone_locks.write().await;
        if locks
            .get(&milestone_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&milestone_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.milestone_locks.read().await.len()
    }
}
