pub mod audit_service;
pub mod consultation_service;
pub mod dispute_service;
pub mod error;
pub mod escrow_service;
pub mod history;
pub mod milestone_machine;
pub mod milestone_service;
pub mod notification_service;
pub mod payment_provider;
pub mod payment_service;
pub mod project_service;

#[cfg(test)]
pub mod testutil;
