use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::money::Cents;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::RequiresPaymentMethod => "requires_payment_method",
            PaymentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentStatus::RequiresAction => "requires_action",
            PaymentStatus::Processing => "processing",
            PaymentStatus::RequiresCapture => "requires_capture",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Unknown => "unknown",
        }
    }
}

/// `pi_` followed by ASCII letters, digits or underscores.
pub fn is_payment_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub amount_cents: Cents,
    pub currency: String,
    pub status: PaymentStatus,
    pub client_secret: Option<String>,
    pub customer_id: Option<String>,
    pub transfer_group: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerRecord {
    pub id: String,
    pub email: Option<String>,
}

/// Settle the charge directly to a connected account, keeping the platform
/// fee at charge time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationCharge {
    pub account_id: String,
    pub application_fee_cents: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRequest {
    pub amount_cents: Cents,
    pub currency: String,
    pub customer_id: Option<String>,
    pub receipt_email: Option<String>,
    pub transfer_group: String,
    pub metadata: BTreeMap<String, String>,
    pub destination: Option<DestinationCharge>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount_cents: Cents,
    pub currency: String,
    pub destination_account: String,
    pub transfer_group: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount_cents: Cents,
    pub destination_account: String,
    pub transfer_group: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment processing is not configured")]
    NotConfigured,
    #[error("{message}")]
    Provider {
        message: String,
        code: Option<String>,
    },
    #[error("payment provider unreachable: {0}")]
    Transport(String),
    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Customers whose email matches exactly, in provider order
    async fn find_customers_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<CustomerRecord>, PaymentError>;

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<CustomerRecord, PaymentError>;

    /// Create a payment intent with the provider
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError>;

    /// Retrieve intent status
    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Move funds from the platform balance to a connected account
    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer, PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let status: PaymentStatus = serde_json::from_str("\"requires_payment_method\"").unwrap();
        assert_eq!(status, PaymentStatus::RequiresPaymentMethod);
        assert_eq!(status.as_str(), "requires_payment_method");

        let unknown: PaymentStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(unknown, PaymentStatus::Unknown);
    }

    #[test]
    fn test_payment_intent_id_shape() {
        assert!(is_payment_intent_id("pi_3NvXyzABCdef123"));
        assert!(is_payment_intent_id("pi_mock_12"));
        assert!(!is_payment_intent_id("pi_"));
        assert!(!is_payment_intent_id("ch_3NvXyz"));
        assert!(!is_payment_intent_id("pi_123/../../v1/balance"));
        assert!(!is_payment_intent_id("pi_123?expand[]=customer"));
    }
}
