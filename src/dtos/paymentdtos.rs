// dtos/paymentdtos.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::paymentmodel::NewPaymentAccount;

// Consultation DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BookConsultationDto {
    pub company_id: Uuid,

    pub fee: BigDecimal,

    #[validate(length(min = 3, max = 200, message = "Topic must be between 3 and 200 characters"))]
    pub topic: String,

    pub scheduled_for: Option<DateTime<Utc>>,

    #[validate(email(message = "A valid payer email is required"))]
    pub email: String,
}

/// Paystack redirects with both `reference` and `trxref`.
#[derive(Debug, Deserialize)]
pub struct PaymentCallbackQuery {
    pub reference: Option<String>,
    pub trxref: Option<String>,
}

impl PaymentCallbackQuery {
    pub fn reference(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .or(self.trxref.as_deref())
            .filter(|r| !r.trim().is_empty())
    }
}

// Payout account DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddPaymentAccountDto {
    #[validate(length(min = 3, max = 10, message = "Bank code must be between 3 and 10 characters"))]
    pub bank_code: String,

    #[validate(length(min = 1, message = "Bank name is required"))]
    pub bank_name: String,

    #[validate(length(equal = 10, message = "Account number must be 10 digits"))]
    pub account_number: String,

    #[validate(length(min = 1, message = "Account name is required"))]
    pub account_name: String,

    #[serde(default)]
    pub make_default: bool,
}

impl AddPaymentAccountDto {
    pub fn into_new_account(self, user_id: Uuid) -> (NewPaymentAccount, bool) {
        (
            NewPaymentAccount {
                user_id,
                bank_code: self.bank_code,
                bank_name: self.bank_name,
                account_number: self.account_number,
                account_name: self.account_name,
            },
            self.make_default,
        )
    }
}
