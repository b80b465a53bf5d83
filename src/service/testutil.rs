// service/testutil.rs
//! Service wiring over the in-memory store and a scripted gateway.
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use uuid::Uuid;

use crate::{
    db::{
        consultationdb::ConsultationExt, db::MarketStore, memory::MemoryStore,
        paymentdb::PaymentAccountExt,
    },
    models::{
        consultationmodel::*,
        escrowmodel::Escrow,
        paymentmodel::{NewPaymentAccount, PaymentAccount},
        projectmodel::{Milestone, NewMilestone, Project, UploadedFile},
    },
    service::{
        audit_service::AuditService,
        consultation_service::ConsultationService,
        dispute_service::DisputeService,
        escrow_service::{EscrowService, EscrowSettings},
        history::HistoryService,
        milestone_service::MilestoneService,
        notification_service::NotificationService,
        payment_provider::*,
        payment_service::PaymentService,
        project_service::ProjectService,
    },
};

pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

pub fn sign_webhook(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

struct Charge {
    status: ChargeStatus,
    amount: BigDecimal,
    metadata: Value,
}

#[derive(Default)]
struct GatewayState {
    charges: HashMap<String, Charge>,
    transfers: Vec<(String, BigDecimal)>,
    refunds: Vec<String>,
    initialized: usize,
    verified: usize,
    fail_transfers: bool,
    fail_refunds: bool,
}

/// Charges succeed for the initialized amount unless scripted otherwise.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn register_charge(&self, reference: &str, amount: BigDecimal, metadata: Value) {
        self.state.lock().unwrap().charges.insert(
            reference.to_string(),
            Charge { status: ChargeStatus::Success, amount, metadata },
        );
    }

    pub fn set_charge_status(&self, reference: &str, status: ChargeStatus) {
        if let Some(charge) = self.state.lock().unwrap().charges.get_mut(reference) {
            charge.status = status;
        }
    }

    pub fn set_charge_amount(&self, reference: &str, amount: BigDecimal) {
        if let Some(charge) = self.state.lock().unwrap().charges.get_mut(reference) {
            charge.amount = amount;
        }
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.state.lock().unwrap().fail_transfers = fail;
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.state.lock().unwrap().fail_refunds = fail;
    }

    pub fn verification_for(&self, reference: &str) -> PaymentVerification {
        let state = self.state.lock().unwrap();
        let charge = &state.charges[reference];
        PaymentVerification {
            reference: reference.to_string(),
            status: charge.status,
            amount: charge.amount.clone(),
            metadata: charge.metadata.clone(),
        }
    }

    pub fn initialize_count(&self) -> usize {
        self.state.lock().unwrap().initialized
    }

    pub fn verify_count(&self) -> usize {
        self.state.lock().unwrap().verified
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().unwrap().transfers.len()
    }

    pub fn transfer_accounts(&self) -> Vec<String> {
        self.state.lock().unwrap().transfers.iter().map(|(a, _)| a.clone()).collect()
    }

    pub fn transfer_amounts(&self) -> Vec<BigDecimal> {
        self.state.lock().unwrap().transfers.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn refund_count(&self) -> usize {
        self.state.lock().unwrap().refunds.len()
    }

    pub fn refunded_references(&self) -> Vec<String> {
        self.state.lock().unwrap().refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider_name(&self) -> &'static str {
        "paystack"
    }

    async fn initialize_payment(
        &self,
        amount: &BigDecimal,
        _currency: &str,
        _email: &str,
        reference: &str,
        metadata: Value,
    ) -> Result<PaymentInit, PaymentProviderError> {
        checked_minor_units(amount)?;
        self.state.lock().unwrap().initialized += 1;
        self.register_charge(reference, amount.clone(), metadata);
        Ok(PaymentInit {
            reference: reference.to_string(),
            authorization_url: format!("https://checkout.test/{}", reference),
            access_code: format!("ac_{}", reference),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, PaymentProviderError> {
        let mut state = self.state.lock().unwrap();
        state.verified += 1;
        let charge = state
            .charges
            .get(reference)
            .ok_or_else(|| PaymentProviderError::Rejected("Transaction reference not found".to_string()))?;
        Ok(PaymentVerification {
            reference: reference.to_string(),
            status: charge.status,
            amount: charge.amount.clone(),
            metadata: charge.metadata.clone(),
        })
    }

    async fn release_funds(
        &self,
        reference: &str,
        recipient: &PayoutRecipient,
        amount: &BigDecimal,
    ) -> Result<TransferResult, PaymentProviderError> {
        checked_minor_units(amount)?;
        // Lets a racing release reach the lock before this one settles.
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.fail_transfers {
            return Err(PaymentProviderError::Rejected("Transfer failed".to_string()));
        }
        state.transfers.push((recipient.account_number.clone(), amount.clone()));
        Ok(TransferResult {
            transfer_reference: reference.to_string(),
            transfer_code: format!("TRF_{}", state.transfers.len()),
            status: "success".to_string(),
        })
    }

    async fn refund_payment(&self, reference: &str) -> Result<RefundResult, PaymentProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_refunds {
            return Err(PaymentProviderError::Rejected("Refund failed".to_string()));
        }
        state.refunds.push(reference.to_string());
        Ok(RefundResult {
            refund_reference: format!("RFD-{}", state.refunds.len()),
            status: "processed".to_string(),
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub audit: Arc<AuditService>,
    pub projects: Arc<ProjectService>,
    pub milestones: Arc<MilestoneService>,
    pub escrow: Arc<EscrowService>,
    pub disputes: Arc<DisputeService>,
    pub consultations: Arc<ConsultationService>,
    pub payments: Arc<PaymentService>,
    pub history: Arc<HistoryService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let db: Arc<dyn MarketStore> = store.clone();
        let provider: Arc<dyn PaymentGateway> = gateway.clone();
        let settings = EscrowSettings {
            currency: "NGN".to_string(),
            platform_fee_percent: dec("10"),
        };

        let audit = Arc::new(AuditService::new(db.clone()));
        let notifications = Arc::new(NotificationService::new(db.clone()));
        let projects = Arc::new(ProjectService::new(db.clone(), audit.clone(), notifications.clone()));
        let milestones = Arc::new(MilestoneService::new(db.clone(), audit.clone(), notifications.clone()));
        let escrow = Arc::new(EscrowService::new(
            db.clone(),
            provider.clone(),
            projects.clone(),
            audit.clone(),
            notifications.clone(),
            settings.clone(),
        ));
        let disputes = Arc::new(DisputeService::new(
            db.clone(),
            projects.clone(),
            audit.clone(),
            notifications.clone(),
        ));
        let consultations = Arc::new(ConsultationService::new(
            db.clone(),
            provider.clone(),
            audit.clone(),
            notifications,
            settings,
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            provider,
            escrow.clone(),
            consultations.clone(),
            audit.clone(),
            WEBHOOK_SECRET.to_string(),
        ));
        let history = Arc::new(HistoryService::new(db));

        Self {
            store,
            gateway,
            audit,
            projects,
            milestones,
            escrow,
            disputes,
            consultations,
            payments,
            history,
        }
    }

    pub fn new_milestone(title: &str, sequence_order: i32, amount: &str) -> NewMilestone {
        NewMilestone {
            title: title.to_string(),
            description: None,
            amount: dec(amount),
            sequence_order,
        }
    }

    pub fn uploaded_file() -> UploadedFile {
        UploadedFile {
            url: "https://files.test/evidence/site.jpg".to_string(),
            thumbnail_url: None,
            width: Some(1280),
            height: Some(720),
            format: "jpg".to_string(),
            bytes: 48_213,
        }
    }

    /// A consultation between two fresh users, driven to `status` through the
    /// store's own transitions.
    pub async fn seed_consultation(&self, status: ConsultationStatus) -> Consultation {
        let reference = format!("CNS-{}", Uuid::new_v4().simple());
        let created = self
            .store
            .create_consultation(NewConsultation {
                client_id: Uuid::new_v4(),
                company_id: Uuid::new_v4(),
                fee: dec("50"),
                topic: "Kitchen remodel".to_string(),
                scheduled_for: None,
                payment_reference: reference.clone(),
            })
            .await
            .unwrap();

        match status {
            ConsultationStatus::PendingPayment => created,
            ConsultationStatus::Cancelled => self
                .store
                .update_consultation_status(created.id, &[ConsultationStatus::PendingPayment], status)
                .await
                .unwrap()
                .unwrap(),
            ConsultationStatus::Scheduled | ConsultationStatus::Completed => {
                let scheduled = self
                    .store
                    .confirm_consultation_payment(&reference)
                    .await
                    .unwrap()
                    .unwrap()
                    .into_inner();
                if status == ConsultationStatus::Scheduled {
                    return scheduled;
                }
                self.store
                    .update_consultation_status(created.id, &[ConsultationStatus::Scheduled], status)
                    .await
                    .unwrap()
                    .unwrap()
            }
        }
    }

    pub async fn seed_project(&self) -> Project {
        let consultation = self.seed_consultation(ConsultationStatus::Completed).await;
        self.projects
            .create_project_from_consultation(
                consultation.id,
                consultation.client_id,
                "Kitchen remodel".to_string(),
                None,
                dec("100"),
                dec("5000"),
            )
            .await
            .unwrap()
    }

    pub async fn seed_milestones(&self, project: &Project, amounts: &[&str]) -> Vec<Milestone> {
        let new = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| Self::new_milestone(&format!("Phase {}", i + 1), i as i32 + 1, amount))
            .collect();
        self.projects
            .create_milestones(project.id, project.company_id, new)
            .await
            .unwrap()
    }

    /// Draft project whose milestones have all been verified by the client.
    pub async fn active_project(&self, amounts: &[&str]) -> (Project, Vec<Milestone>) {
        let project = self.seed_project().await;
        let milestones = self.seed_milestones(&project, amounts).await;
        for milestone in &milestones {
            self.projects
                .verify_milestone(milestone.id, project.client_id, None)
                .await
                .unwrap();
        }
        (
            self.projects.get_project(project.id).await.unwrap(),
            self.projects.get_project_milestones(project.id).await.unwrap(),
        )
    }

    pub async fn fund(&self, milestone: &Milestone) -> Escrow {
        let project = self.projects.get_project(milestone.project_id).await.unwrap();
        let init = self
            .escrow
            .initialize_funding(milestone.id, project.client_id, "client@example.com")
            .await
            .unwrap();
        self.escrow.confirm_funding(&init.reference).await.unwrap()
    }

    pub async fn add_evidence(&self, milestone: &Milestone, actor_id: Uuid) {
        self.milestones
            .add_evidence(milestone.id, actor_id, Self::uploaded_file(), None)
            .await
            .unwrap();
    }

    pub async fn approved_milestone(&self, milestone: &Milestone, project: &Project) -> Milestone {
        self.fund(milestone).await;
        self.add_evidence(milestone, project.company_id).await;
        self.milestones.submit(milestone.id, project.company_id).await.unwrap();
        self.milestones.approve(milestone.id, project.client_id).await.unwrap()
    }

    pub async fn add_payout_account(&self, user_id: Uuid) -> PaymentAccount {
        let account_number = format!("{:010}", Uuid::new_v4().as_u128() % 10_000_000_000);
        self.store
            .add_payment_account(
                NewPaymentAccount {
                    user_id,
                    bank_code: "058".to_string(),
                    bank_name: "GTBank".to_string(),
                    account_number,
                    account_name: "Acme Builders".to_string(),
                },
                false,
            )
            .await
            .unwrap()
    }

    /// Notifications are written from spawned tasks.
    pub async fn wait_for_notifications(&self, user_id: Uuid, expected: usize) {
        for _ in 0..200 {
            if self.store.notifications_for(user_id).await.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} notifications for {}", expected, user_id);
    }
}
