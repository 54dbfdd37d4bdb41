use barcart_core::payment::{PaymentError, PaymentStatus};
use barcart_core::CoreError;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableItem {
    pub product_name: String,
    pub available: i64,
    pub requested: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("No items in cart")]
    EmptyCart,

    #[error("{0}")]
    InvalidItem(String),

    #[error("Some items are no longer available in the requested quantity")]
    InsufficientInventory(Vec<UnavailableItem>),

    #[error("Failed to fetch store information")]
    StoreLookup(String),

    #[error("Failed to calculate taxes")]
    TaxCalculation(String),

    #[error("Payment processing is not configured")]
    PaymentNotConfigured,

    #[error("Invalid payment intent id")]
    InvalidPaymentIntent,

    #[error("{0}")]
    PaymentProvider(String),

    #[error("Payment not completed")]
    PaymentNotCompleted { status: PaymentStatus },

    #[error("Orders already exist for payment intent {payment_intent_id}")]
    AlreadyMaterialized {
        payment_intent_id: String,
        order_ids: Vec<Uuid>,
    },

    #[error("Checkout failed: {0}")]
    Internal(String),
}

impl From<PaymentError> for CheckoutError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured => CheckoutError::PaymentNotConfigured,
            PaymentError::Provider { message, .. } => CheckoutError::PaymentProvider(message),
            other => CheckoutError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => CheckoutError::InvalidItem(msg),
        }
    }
}
