use barcart_core::payment::{
    DestinationCharge, IntentRequest, PaymentIntent, PaymentProvider,
};
use barcart_core::pricing::{FeeCalculator, FeeQuote};
use barcart_core::ShippingAddress;
use barcart_shared::Masked;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::CheckoutError;
use crate::metadata::{
    encode_breakdown, encode_shipping_address, BreakdownEntry, CUSTOMER_EMAIL_KEY,
    CUSTOMER_ID_KEY, PLATFORM_FEE_KEY,
};
use crate::partition::PartitionedCart;

/// The charge created for one checkout attempt.
#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    pub intent: PaymentIntent,
    pub platform_fee: FeeQuote,
    pub transfer_group: String,
    pub breakdown: Vec<BreakdownEntry>,
}

/// Builds the single payment intent that covers a whole multi-store cart.
pub struct PaymentOrchestrator {
    provider: Option<Arc<dyn PaymentProvider>>,
    fees: Arc<dyn FeeCalculator>,
    currency: String,
}

impl PaymentOrchestrator {
    pub fn new(provider: Option<Arc<dyn PaymentProvider>>, fees: Arc<dyn FeeCalculator>) -> Self {
        Self {
            provider,
            fees,
            currency: "usd".to_string(),
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_ascii_lowercase();
        self
    }

    pub fn provider(&self) -> Result<&Arc<dyn PaymentProvider>, CheckoutError> {
        self.provider.as_ref().ok_or(CheckoutError::PaymentNotConfigured)
    }

    /// First customer with exactly this email, else a new one
    pub async fn resolve_customer(
        &self,
        email: &Masked<String>,
        name: Option<&str>,
    ) -> Result<String, CheckoutError> {
        let provider = self.provider()?;
        let existing = provider.find_customers_by_email(email.expose()).await?;
        if let Some(customer) = existing
            .into_iter()
            .find(|c| c.email.as_deref() == Some(email.expose().as_str()))
        {
            return Ok(customer.id);
        }
        let created = provider.create_customer(email.expose(), name).await?;
        info!(customer = %created.id, email = %email.email_hint(), "created payment customer");
        Ok(created.id)
    }

    #[instrument(skip_all, fields(stores = cart.groups.len(), total_cents = cart.total_cents))]
    pub async fn create_checkout_intent(
        &self,
        cart: &PartitionedCart,
        customer_id: Option<Uuid>,
        email: &Masked<String>,
        customer_name: Option<&str>,
        address: &ShippingAddress,
    ) -> Result<CheckoutIntent, CheckoutError> {
        let provider = self.provider()?;
        let provider_customer = self.resolve_customer(email, customer_name).await?;

        let state = address.state_code();
        let platform_fee = self
            .fees
            .platform_fee(cart.total_cents, state.as_deref())
            .await
            .map_err(|e| CheckoutError::Internal(format!("fee calculation failed: {}", e)))?;

        let transfer_group = new_transfer_group();
        let breakdown: Vec<BreakdownEntry> = cart.groups.iter().map(BreakdownEntry::from).collect();

        let mut metadata = BTreeMap::new();
        encode_breakdown(&breakdown, &mut metadata)
            .map_err(|e| CheckoutError::Internal(e.to_string()))?;
        metadata.insert(PLATFORM_FEE_KEY.to_string(), platform_fee.commission_cents.to_string());
        metadata.insert(CUSTOMER_EMAIL_KEY.to_string(), email.expose().clone());
        if let Some(id) = customer_id {
            metadata.insert(CUSTOMER_ID_KEY.to_string(), id.to_string());
        }
        let recorded = encode_shipping_address(address, &mut metadata)
            .map_err(|e| CheckoutError::Internal(e.to_string()))?;
        if !recorded {
            warn!("shipping address too long for payment metadata; omitted");
        }

        let request = IntentRequest {
            amount_cents: cart.total_cents,
            currency: self.currency.clone(),
            customer_id: Some(provider_customer),
            receipt_email: Some(email.expose().clone()),
            transfer_group: transfer_group.clone(),
            metadata,
            destination: destination_for(cart, &platform_fee),
            idempotency_key: Some(format!("checkout_{}", transfer_group)),
        };

        let intent = provider.create_intent(&request).await?;
        info!(
            intent = %intent.id,
            transfer_group = %transfer_group,
            direct = request.destination.is_some(),
            "payment intent created"
        );

        Ok(CheckoutIntent {
            intent,
            platform_fee,
            transfer_group,
            breakdown,
        })
    }
}

/// Single-store carts settle straight to the store's account, so no
/// transfer is needed after confirmation.
fn destination_for(cart: &PartitionedCart, fee: &FeeQuote) -> Option<DestinationCharge> {
    match cart.groups.as_slice() {
        [only] => only.payout_account_id.as_ref().map(|account| DestinationCharge {
            account_id: account.clone(),
            application_fee_cents: fee.commission_cents,
        }),
        _ => None,
    }
}

fn new_transfer_group() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("order_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}
