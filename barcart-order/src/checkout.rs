use barcart_core::pricing::FeeQuote;
use tracing::{info, instrument};

use crate::error::CheckoutError;
use crate::metadata::BreakdownEntry;
use crate::models::CheckoutRequest;
use crate::orchestrator::PaymentOrchestrator;
use crate::partition::{CartPartitioner, PartitionedCart};

/// What the storefront needs to confirm payment and show the order summary.
#[derive(Debug, Clone)]
pub struct CheckoutSummary {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub cart: PartitionedCart,
    pub platform_fee: FeeQuote,
    pub breakdown: Vec<BreakdownEntry>,
    pub transfer_group: String,
}

/// Partition → create payment intent.
pub struct CheckoutService {
    partitioner: CartPartitioner,
    payments: PaymentOrchestrator,
}

impl CheckoutService {
    pub fn new(partitioner: CartPartitioner, payments: PaymentOrchestrator) -> Self {
        Self {
            partitioner,
            payments,
        }
    }

    #[instrument(skip_all, fields(items = request.items.len(), email = %request.customer_email.email_hint()))]
    pub async fn begin_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSummary, CheckoutError> {
        self.payments.provider()?;

        let cart = self
            .partitioner
            .partition(&request.items, &request.shipping_address)
            .await?;

        let created = self
            .payments
            .create_checkout_intent(
                &cart,
                request.customer_id,
                &request.customer_email,
                request.customer_name.as_deref(),
                &request.shipping_address,
            )
            .await?;

        info!(
            intent = %created.intent.id,
            stores = cart.groups.len(),
            total_cents = cart.total_cents,
            "checkout started"
        );

        Ok(CheckoutSummary {
            client_secret: created.intent.client_secret.clone(),
            payment_intent_id: created.intent.id.clone(),
            cart,
            platform_fee: created.platform_fee,
            breakdown: created.breakdown,
            transfer_group: created.transfer_group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::{FeeRule, FeeSchedule};
    use crate::mock::{
        cart_item, store_profile, FixedTaxCalculator, InMemoryMarketplace, MockPaymentProvider,
    };
    use barcart_core::ShippingAddress;
    use barcart_shared::Masked;
    use std::sync::Arc;

    fn service(
        market: &Arc<InMemoryMarketplace>,
        provider: Option<Arc<MockPaymentProvider>>,
    ) -> CheckoutService {
        let partitioner = CartPartitioner::new(
            market.clone(),
            market.clone(),
            Arc::new(FixedTaxCalculator::new(0, 0.0)),
        );
        let fees = Arc::new(FeeSchedule::new(FeeRule { percent: 10.0, fixed_cents: 0 }));
        let provider = provider.map(|p| p as Arc<dyn barcart_core::payment::PaymentProvider>);
        CheckoutService::new(partitioner, PaymentOrchestrator::new(provider, fees))
    }

    fn request(items: Vec<barcart_core::CartItem>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            customer_id: None,
            customer_email: Masked::new("buyer@example.com".to_string()),
            customer_name: None,
            shipping_address: ShippingAddress::default(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_reported_first() {
        let market = Arc::new(InMemoryMarketplace::new());
        let result = service(&market, None).begin_checkout(&request(Vec::new())).await;
        assert!(matches!(result, Err(CheckoutError::PaymentNotConfigured)));
    }

    #[tokio::test]
    async fn test_summary_carries_intent_and_totals() {
        let market = Arc::new(InMemoryMarketplace::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let store = market.add_store(store_profile("Corner Liquors", Some("acct_a")));
        let item = cart_item(Some(store), 25.0, 2);
        market.set_stock(item.id, 3);

        let summary = service(&market, Some(provider.clone()))
            .begin_checkout(&request(vec![item]))
            .await
            .unwrap();

        assert_eq!(summary.cart.total_cents, 5000 + 499);
        assert_eq!(
            summary.platform_fee.commission_cents,
            barcart_core::money::percent_of(summary.cart.total_cents, 10.0)
        );
        assert!(summary.client_secret.is_some());
        assert_eq!(summary.breakdown.len(), 1);
        assert_eq!(provider.intent_requests()[0].amount_cents, summary.cart.total_cents);
    }
}
