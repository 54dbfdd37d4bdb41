use std::sync::Arc;

use barcart_core::inventory::InventoryService;
use barcart_core::payment::PaymentProvider;
use barcart_core::pricing::{FeeCalculator, TaxCalculator};
use barcart_core::repository::{
    DeliveryRepository, NotificationService, OrderRepository, StoreDirectory,
};
use barcart_core::Cents;
use barcart_order::{CartPartitioner, CheckoutService, OrderMaterializer, PaymentOrchestrator};
use barcart_store::RedisClient;

/// Everything the checkout flow talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// `None` when no payment provider credentials are configured
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub stores: Arc<dyn StoreDirectory>,
    pub inventory: Arc<dyn InventoryService>,
    pub orders: Arc<dyn OrderRepository>,
    pub deliveries: Arc<dyn DeliveryRepository>,
    pub notifications: Arc<dyn NotificationService>,
    pub tax: Arc<dyn TaxCalculator>,
    pub fees: Arc<dyn FeeCalculator>,
}

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub requests_per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub materializer: Arc<OrderMaterializer>,
    pub rate_limit: Option<RateLimit>,
}

impl AppState {
    pub fn new(c: Collaborators, currency: &str, default_delivery_fee_cents: Cents) -> Self {
        let partitioner = CartPartitioner::new(c.stores.clone(), c.inventory.clone(), c.tax)
            .with_default_delivery_fee(default_delivery_fee_cents);
        let payments = PaymentOrchestrator::new(c.payments.clone(), c.fees.clone())
            .with_currency(currency);
        let materializer = OrderMaterializer::new(
            c.payments,
            c.fees,
            c.stores,
            c.orders,
            c.inventory,
            c.deliveries,
            c.notifications,
        );

        Self {
            checkout: Arc::new(CheckoutService::new(partitioner, payments)),
            materializer: Arc::new(materializer),
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, requests_per_minute: i64) -> Self {
        self.rate_limit = Some(RateLimit {
            redis,
            requests_per_minute,
        });
        self
    }
}
