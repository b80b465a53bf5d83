pub mod db;
pub mod projectdb;
pub mod escrowdb;
pub mod disputedb;
pub mod paymentdb;
pub mod consultationdb;
pub mod auditdb;
pub mod notificationdb;

#[cfg(test)]
pub mod memory;
