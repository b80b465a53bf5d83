// service/payment_provider.rs
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{
    config::Config,
    utils::currency::{from_minor_units, is_positive, to_minor_units},
};

#[derive(Error, Debug)]
pub enum PaymentProviderError {
    #[error("Amount must be greater than zero, got {0}")]
    InvalidAmount(BigDecimal),

    #[error("Payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Payment {reference} was not successful (status: {status})")]
    NotSuccessful { reference: String, status: String },

    #[error("Webhook signature mismatch")]
    SignatureMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Success,
    Failed,
    Pending,
}

impl ChargeStatus {
    fn from_gateway(status: &str) -> Self {
        match status {
            "success" => ChargeStatus::Success,
            "failed" | "abandoned" | "reversed" => ChargeStatus::Failed,
            _ => ChargeStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub reference: String,
    pub status: ChargeStatus,
    pub amount: BigDecimal,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRecipient {
    pub account_name: String,
    pub account_number: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer_reference: String,
    pub transfer_code: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund_reference: String,
    pub status: String,
}

/// Money crosses this boundary in kobo; callers pass naira.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn initialize_payment(
        &self,
        amount: &BigDecimal,
        currency: &str,
        email: &str,
        reference: &str,
        metadata: Value,
    ) -> Result<PaymentInit, PaymentProviderError>;

    async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, PaymentProviderError>;

    /// `reference` is the caller-chosen transfer reference; reusing it for the
    /// same payout makes the provider reject the duplicate.
    async fn release_funds(
        &self,
        reference: &str,
        recipient: &PayoutRecipient,
        amount: &BigDecimal,
    ) -> Result<TransferResult, PaymentProviderError>;

    async fn refund_payment(&self, reference: &str) -> Result<RefundResult, PaymentProviderError>;
}

/// Rejects non-positive amounts and converts to kobo. Runs before any request.
pub fn checked_minor_units(amount: &BigDecimal) -> Result<i64, PaymentProviderError> {
    if !is_positive(amount) {
        return Err(PaymentProviderError::InvalidAmount(amount.clone()));
    }
    to_minor_units(amount)
        .filter(|kobo| *kobo > 0)
        .ok_or_else(|| PaymentProviderError::InvalidAmount(amount.clone()))
}

/// hex(HMAC-SHA512(raw body, secret)) compared in constant time.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature: &str,
    secret: &str,
) -> Result<(), PaymentProviderError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentProviderError::SignatureMismatch)?;
    mac.update(payload);

    let expected_signature_hex = hex::encode(mac.finalize().into_bytes());

    let matches: bool = ConstantTimeEq::ct_eq(
        signature.trim().to_ascii_lowercase().as_bytes(),
        expected_signature_hex.as_bytes(),
    )
    .into();

    if matches {
        Ok(())
    } else {
        Err(PaymentProviderError::SignatureMismatch)
    }
}

pub struct PaystackGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
    callback_url: String,
}

impl PaystackGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: config.paystack_secret_key.clone(),
            base_url: config.paystack_base_url.trim_end_matches('/').to_string(),
            callback_url: config.payment_callback_url.clone(),
        }
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, PaymentProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        Self::unwrap_data(response.json().await?)
    }

    async fn get(&self, path: &str) -> Result<Value, PaymentProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .send()
            .await?;

        Self::unwrap_data(response.json().await?)
    }

    /// Paystack wraps every response as `{status, message, data}`.
    fn unwrap_data(body: Value) -> Result<Value, PaymentProviderError> {
        if body["status"].as_bool().unwrap_or(false) {
            Ok(body["data"].clone())
        } else {
            Err(PaymentProviderError::Rejected(
                body["message"]
                    .as_str()
                    .unwrap_or("Paystack request failed")
                    .to_string(),
            ))
        }
    }

    async fn create_transfer_recipient(
        &self,
        recipient: &PayoutRecipient,
    ) -> Result<String, PaymentProviderError> {
        let data = self
            .post(
                "/transferrecipient",
                &serde_json::json!({
                    "type": "nuban",
                    "name": recipient.account_name,
                    "account_number": recipient.account_number,
                    "bank_code": recipient.bank_code,
                    "currency": "NGN"
                }),
            )
            .await?;

        data["recipient_code"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PaymentProviderError::Rejected("Missing recipient code".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn provider_name(&self) -> &'static str {
        "paystack"
    }

    async fn initialize_payment(
        &self,
        amount: &BigDecimal,
        currency: &str,
        email: &str,
        reference: &str,
        metadata: Value,
    ) -> Result<PaymentInit, PaymentProviderError> {
        let amount_kobo = checked_minor_units(amount)?;

        let data = self
            .post(
                "/transaction/initialize",
                &serde_json::json!({
                    "email": email,
                    "amount": amount_kobo,
                    "reference": reference,
                    "currency": currency,
                    "callback_url": self.callback_url,
                    "metadata": metadata,
                }),
            )
            .await?;

        Ok(PaymentInit {
            reference: data["reference"].as_str().unwrap_or(reference).to_string(),
            authorization_url: data["authorization_url"].as_str().unwrap_or_default().to_string(),
            access_code: data["access_code"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, PaymentProviderError> {
        let data = self.get(&format!("/transaction/verify/{}", reference)).await?;

        let metadata = match &data["metadata"] {
            // Paystack echoes metadata back as a string when it was sent as one.
            Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
            other => other.clone(),
        };

        Ok(PaymentVerification {
            reference: data["reference"].as_str().unwrap_or(reference).to_string(),
            status: ChargeStatus::from_gateway(data["status"].as_str().unwrap_or_default()),
            amount: from_minor_units(data["amount"].as_i64().unwrap_or(0)),
            metadata,
        })
    }

    async fn release_funds(
        &self,
        reference: &str,
        recipient: &PayoutRecipient,
        amount: &BigDecimal,
    ) -> Result<TransferResult, PaymentProviderError> {
        let amount_kobo = checked_minor_units(amount)?;
        let recipient_code = self.create_transfer_recipient(recipient).await?;

        let data = self
            .post(
                "/transfer",
                &serde_json::json!({
                    "source": "balance",
                    "amount": amount_kobo,
                    "reference": reference,
                    "recipient": recipient_code,
                    "reason": "Milestone escrow release"
                }),
            )
            .await?;

        Ok(TransferResult {
            transfer_reference: data["reference"].as_str().unwrap_or(reference).to_string(),
            transfer_code: data["transfer_code"].as_str().unwrap_or_default().to_string(),
            status: data["status"].as_str().unwrap_or("pending").to_string(),
        })
    }

    async fn refund_payment(&self, reference: &str) -> Result<RefundResult, PaymentProviderError> {
        let data = self
            .post("/refund", &serde_json::json!({ "transaction": reference }))
            .await?;

        let refund_reference = data["id"]
            .as_i64()
            .map(|id| id.to_string())
            .or_else(|| data["reference"].as_str().map(str::to_string))
            .unwrap_or_else(|| reference.to_string());

        Ok(RefundResult {
            refund_reference,
            status: data["status"].as_str().unwrap_or("pending").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"event":"charge.success","data":{"reference":"ref-1"}}"#;
        let signature = sign(body, "sk_test");
        assert!(verify_webhook_signature(body, &signature, "sk_test").is_ok());
    }

    #[test]
    fn rejects_signature_from_other_secret() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign(body, "sk_other");
        assert!(matches!(
            verify_webhook_signature(body, &signature, "sk_test"),
            Err(PaymentProviderError::SignatureMismatch)
        ));
    }

    #[test]
    fn signature_covers_raw_bytes() {
        let signed = br#"{"event":"charge.success","data":{}}"#;
        let reformatted = br#"{"event": "charge.success", "data": {}}"#;
        let signature = sign(signed, "sk_test");
        assert!(verify_webhook_signature(reformatted, &signature, "sk_test").is_err());
    }

    #[test]
    fn rejects_non_positive_amounts_before_conversion() {
        assert!(matches!(
            checked_minor_units(&BigDecimal::from(0)),
            Err(PaymentProviderError::InvalidAmount(_))
        ));
        assert!(checked_minor_units(&BigDecimal::from(-10)).is_err());
        assert!(checked_minor_units(&BigDecimal::from_str("0.001").unwrap()).is_err());
        assert_eq!(checked_minor_units(&BigDecimal::from_str("250.75").unwrap()).unwrap(), 25075);
    }

    #[test]
    fn maps_gateway_charge_status() {
        assert_eq!(ChargeStatus::from_gateway("success"), ChargeStatus::Success);
        assert_eq!(ChargeStatus::from_gateway("abandoned"), ChargeStatus::Failed);
        assert_eq!(ChargeStatus::from_gateway("ongoing"), ChargeStatus::Pending);
    }
}
