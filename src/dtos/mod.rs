pub mod paymentdtos;
pub mod projectdtos;
