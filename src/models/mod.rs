pub mod auditmodel;
pub mod consultationmodel;
pub mod disputemodel;
pub mod escrowmodel;
pub mod paymentmodel;
pub mod projectmodel;
