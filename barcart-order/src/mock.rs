//! In-memory collaborators for tests and local wiring.

use async_trait::async_trait;
use barcart_core::inventory::{DecrementOutcome, InventoryLevel, InventoryRequest, InventoryService};
use barcart_core::payment::{
    CustomerRecord, IntentRequest, PaymentError, PaymentIntent, PaymentProvider, PaymentStatus,
    Transfer, TransferRequest,
};
use barcart_core::pricing::{TaxCalculator, TaxLine, TaxQuote};
use barcart_core::repository::{
    DeliveryCompany, DeliveryRepository, InsertOutcome, NewDelivery, NewOrder, NewOrderItem,
    Notification, NotificationService, OrderRecord, OrderRepository, OrderStatus, StoreDirectory,
    StoreLocation, StoreProfile,
};
use barcart_core::{BoxError, CartItem, Cents, ShippingAddress};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn cart_item(store_id: Option<Uuid>, price: f64, quantity: u32) -> CartItem {
    CartItem {
        id: Uuid::new_v4(),
        product_id: Some(Uuid::new_v4()),
        product_name: "Small Batch Bourbon".to_string(),
        store_id,
        store_name: Some("Test Store".to_string()),
        price,
        quantity,
        taxes: 0.0,
        shipping_cost: 0.0,
        category: Some("spirits".to_string()),
        is_alcohol: true,
    }
}

pub fn store_profile(name: &str, payout_account: Option<&str>) -> StoreProfile {
    StoreProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        tenant_id: Some(Uuid::new_v4()),
        payout_account_id: payout_account.map(str::to_string),
        delivery_fee_cents: None,
        free_delivery_threshold_cents: None,
    }
}

pub fn delivery_company(name: &str, is_active: bool) -> DeliveryCompany {
    DeliveryCompany {
        id: Uuid::new_v4(),
        name: name.to_string(),
        is_active,
    }
}

pub fn new_order(store_id: Uuid) -> NewOrder {
    NewOrder {
        id: Uuid::new_v4(),
        order_number: crate::models::generate_order_number(),
        customer_id: None,
        store_id,
        subtotal_cents: 4000,
        tax_cents: 360,
        delivery_fee_cents: 499,
        platform_fee_cents: 0,
        total_cents: 4859,
        status: OrderStatus::Confirmed,
        payment_status: "paid".to_string(),
        payment_method: "card".to_string(),
        stripe_payment_intent_id: "pi_test".to_string(),
        shipping_address: serde_json::Value::Null,
        created_at: Utc::now(),
    }
}

/// Returns the same tax amount for every cart.
pub struct FixedTaxCalculator {
    tax_cents: Cents,
    rate: f64,
}

impl FixedTaxCalculator {
    pub fn new(tax_cents: Cents, rate: f64) -> Self {
        Self { tax_cents, rate }
    }
}

#[async_trait]
impl TaxCalculator for FixedTaxCalculator {
    async fn calculate(
        &self,
        _items: &[CartItem],
        _subtotal_cents: Cents,
        _address: &ShippingAddress,
    ) -> Result<TaxQuote, BoxError> {
        Ok(TaxQuote {
            tax_cents: self.tax_cents,
            rate: self.rate,
            breakdown: vec![TaxLine {
                name: "Sales tax".to_string(),
                rate: self.rate,
                amount_cents: self.tax_cents,
            }],
        })
    }
}

/// Tax service that is always down.
pub struct UnavailableTaxCalculator;

#[async_trait]
impl TaxCalculator for UnavailableTaxCalculator {
    async fn calculate(
        &self,
        _items: &[CartItem],
        _subtotal_cents: Cents,
        _address: &ShippingAddress,
    ) -> Result<TaxQuote, BoxError> {
        Err("tax service unavailable".into())
    }
}

#[derive(Default)]
struct PaymentState {
    customers: Vec<CustomerRecord>,
    intents: HashMap<String, PaymentIntent>,
    intent_requests: Vec<IntentRequest>,
    transfers: Vec<TransferRequest>,
    failing_accounts: HashSet<String>,
    customer_error: Option<String>,
    intent_error: Option<String>,
    sequence: u64,
}

impl PaymentState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}_mock_{}", prefix, self.sequence)
    }
}

/// Payment provider that keeps customers, intents and transfers in memory.
#[derive(Default)]
pub struct MockPaymentProvider {
    state: Mutex<PaymentState>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, email: &str) -> String {
        let mut state = lock(&self.state);
        let id = state.next_id("cus");
        state.customers.push(CustomerRecord {
            id: id.clone(),
            email: Some(email.to_string()),
        });
        id
    }

    pub fn customer_count(&self) -> usize {
        lock(&self.state).customers.len()
    }

    /// Registers an intent as if the buyer had already gone through checkout.
    pub fn add_intent(
        &self,
        amount_cents: Cents,
        status: PaymentStatus,
        metadata: BTreeMap<String, String>,
    ) -> String {
        let mut state = lock(&self.state);
        let id = state.next_id("pi");
        let intent = PaymentIntent {
            id: id.clone(),
            amount_cents,
            currency: "usd".to_string(),
            status,
            client_secret: Some(format!("{}_secret", id)),
            customer_id: None,
            transfer_group: Some(format!("order_test_{}", id)),
            metadata,
            created_at: Utc::now(),
        };
        state.intents.insert(id.clone(), intent);
        id
    }

    pub fn set_intent_status(&self, intent_id: &str, status: PaymentStatus) {
        if let Some(intent) = lock(&self.state).intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    pub fn intent_requests(&self) -> Vec<IntentRequest> {
        lock(&self.state).intent_requests.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        lock(&self.state).transfers.clone()
    }

    pub fn fail_transfers_to(&self, account_id: &str) {
        lock(&self.state).failing_accounts.insert(account_id.to_string());
    }

    /// Customer lookups fail with this provider message.
    pub fn reject_customer_lookups(&self, message: &str) {
        lock(&self.state).customer_error = Some(message.to_string());
    }

    /// Intent creation fails with this provider message.
    pub fn reject_intents(&self, message: &str) {
        lock(&self.state).intent_error = Some(message.to_string());
    }
}

fn rejected(message: &str) -> PaymentError {
    PaymentError::Provider {
        message: message.to_string(),
        code: Some("card_declined".to_string()),
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn find_customers_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<CustomerRecord>, PaymentError> {
        let state = lock(&self.state);
        if let Some(message) = &state.customer_error {
            return Err(rejected(message));
        }
        Ok(state
            .customers
            .iter()
            .filter(|c| c.email.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn create_customer(
        &self,
        email: &str,
        _name: Option<&str>,
    ) -> Result<CustomerRecord, PaymentError> {
        let id = self.add_customer(email);
        Ok(CustomerRecord {
            id,
            email: Some(email.to_string()),
        })
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.intent_error {
            return Err(rejected(message));
        }
        let id = state.next_id("pi");
        let intent = PaymentIntent {
            id: id.clone(),
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            status: PaymentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("{}_secret", id)),
            customer_id: request.customer_id.clone(),
            transfer_group: Some(request.transfer_group.clone()),
            metadata: request.metadata.clone(),
            created_at: Utc::now(),
        };
        state.intent_requests.push(request.clone());
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        lock(&self.state)
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::Provider {
                message: format!("No such payment_intent: '{}'", intent_id),
                code: Some("resource_missing".to_string()),
            })
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer, PaymentError> {
        let mut state = lock(&self.state);
        if state.failing_accounts.contains(&request.destination_account) {
            return Err(PaymentError::Provider {
                message: format!("No such destination: '{}'", request.destination_account),
                code: Some("account_invalid".to_string()),
            });
        }
        let id = state.next_id("tr");
        state.transfers.push(request.clone());
        Ok(Transfer {
            id,
            amount_cents: request.amount_cents,
            destination_account: request.destination_account.clone(),
            transfer_group: request.transfer_group.clone(),
        })
    }
}

#[derive(Default)]
struct Failures {
    availability: bool,
    store_lookups: bool,
    order_items: bool,
    deliveries: bool,
    driver_assignment: bool,
    notifications: bool,
}

#[derive(Default)]
struct MarketState {
    stores: HashMap<Uuid, StoreProfile>,
    locations: HashMap<Uuid, StoreLocation>,
    stock: HashMap<Uuid, i64>,
    companies: Vec<DeliveryCompany>,
    preferences: Vec<(Uuid, Uuid, i32)>,
    drivers: Vec<(Uuid, Uuid)>,
    busy_drivers: HashSet<Uuid>,
    owner_counts: HashMap<Uuid, usize>,
    orders: Vec<NewOrder>,
    order_items: Vec<NewOrderItem>,
    deliveries: Vec<NewDelivery>,
    notifications: Vec<(Uuid, Notification)>,
    failures: Failures,
}

/// Stores, stock, orders, deliveries and notifications for a single test.
#[derive(Default)]
pub struct InMemoryMarketplace {
    state: Mutex<MarketState>,
}

impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_store(&self, profile: StoreProfile) -> Uuid {
        let id = profile.id;
        lock(&self.state).stores.insert(id, profile);
        id
    }

    pub fn add_location(&self, store_id: Uuid, state: &str) -> Uuid {
        let location = StoreLocation {
            id: Uuid::new_v4(),
            store_id,
            name: Some("Main".to_string()),
            address_line: "100 Market St".to_string(),
            city: "Springfield".to_string(),
            state: state.to_string(),
            zip_code: "62701".to_string(),
            latitude: None,
            longitude: None,
        };
        let id = location.id;
        lock(&self.state).locations.insert(store_id, location);
        id
    }

    pub fn set_stock(&self, inventory_id: Uuid, quantity: i64) {
        lock(&self.state).stock.insert(inventory_id, quantity);
    }

    pub fn stock(&self, inventory_id: Uuid) -> Option<i64> {
        lock(&self.state).stock.get(&inventory_id).copied()
    }

    pub fn add_company(&self, company: DeliveryCompany) -> Uuid {
        let id = company.id;
        lock(&self.state).companies.push(company);
        id
    }

    /// Lower rank is preferred.
    pub fn prefer_company(&self, store_id: Uuid, company_id: Uuid, rank: i32) {
        lock(&self.state).preferences.push((store_id, company_id, rank));
    }

    pub fn add_driver(&self, company_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).drivers.push((id, company_id));
        id
    }

    pub fn set_owner_count(&self, store_id: Uuid, owners: usize) {
        lock(&self.state).owner_counts.insert(store_id, owners);
    }

    pub fn fail_availability_checks(&self) {
        lock(&self.state).failures.availability = true;
    }

    pub fn fail_store_lookups(&self) {
        lock(&self.state).failures.store_lookups = true;
    }

    pub fn fail_order_items(&self) {
        lock(&self.state).failures.order_items = true;
    }

    pub fn fail_deliveries(&self) {
        lock(&self.state).failures.deliveries = true;
    }

    pub fn fail_driver_assignment(&self) {
        lock(&self.state).failures.driver_assignment = true;
    }

    pub fn fail_notifications(&self) {
        lock(&self.state).failures.notifications = true;
    }

    pub fn orders(&self) -> Vec<NewOrder> {
        lock(&self.state).orders.clone()
    }

    pub fn order_items(&self) -> Vec<NewOrderItem> {
        lock(&self.state).order_items.clone()
    }

    pub fn deliveries(&self) -> Vec<NewDelivery> {
        lock(&self.state).deliveries.clone()
    }

    pub fn notifications(&self) -> Vec<(Uuid, Notification)> {
        lock(&self.state).notifications.clone()
    }
}

#[async_trait]
impl StoreDirectory for InMemoryMarketplace {
    async fn get_stores(&self, ids: &[Uuid]) -> Result<Vec<StoreProfile>, BoxError> {
        let state = lock(&self.state);
        if state.failures.store_lookups {
            return Err("store directory unavailable".into());
        }
        Ok(ids.iter().filter_map(|id| state.stores.get(id).cloned()).collect())
    }

    async fn primary_location(&self, store_id: Uuid) -> Result<Option<StoreLocation>, BoxError> {
        Ok(lock(&self.state).locations.get(&store_id).cloned())
    }
}

#[async_trait]
impl InventoryService for InMemoryMarketplace {
    async fn check_availability(
        &self,
        requests: &[InventoryRequest],
    ) -> Result<Vec<InventoryLevel>, BoxError> {
        let state = lock(&self.state);
        if state.failures.availability {
            return Err("inventory service unavailable".into());
        }
        Ok(requests
            .iter()
            .filter_map(|r| {
                state.stock.get(&r.inventory_id).map(|available| InventoryLevel {
                    inventory_id: r.inventory_id,
                    available: *available,
                })
            })
            .collect())
    }

    async fn reserve_and_decrement(
        &self,
        inventory_id: Uuid,
        quantity: u32,
    ) -> Result<DecrementOutcome, BoxError> {
        let mut state = lock(&self.state);
        let Some(available) = state.stock.get_mut(&inventory_id) else {
            return Ok(DecrementOutcome::NotFound);
        };
        if *available < i64::from(quantity) {
            return Ok(DecrementOutcome::Insufficient {
                available: *available,
            });
        }
        *available -= i64::from(quantity);
        Ok(DecrementOutcome::Decremented {
            remaining: *available,
        })
    }
}

#[async_trait]
impl OrderRepository for InMemoryMarketplace {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Vec<OrderRecord>, BoxError> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .filter(|o| o.stripe_payment_intent_id == payment_intent_id)
            .map(|o| OrderRecord {
                id: o.id,
                order_number: o.order_number.clone(),
                store_id: o.store_id,
                total_cents: o.total_cents,
            })
            .collect())
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<InsertOutcome, BoxError> {
        let mut state = lock(&self.state);
        let duplicate = state.orders.iter().any(|o| {
            o.stripe_payment_intent_id == order.stripe_payment_intent_id
                && o.store_id == order.store_id
        });
        if duplicate {
            return Ok(InsertOutcome::Duplicate);
        }
        state.orders.push(order.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_order_items(&self, items: &[NewOrderItem]) -> Result<(), BoxError> {
        let mut state = lock(&self.state);
        if state.failures.order_items {
            return Err("order_items insert failed".into());
        }
        state.order_items.extend_from_slice(items);
        Ok(())
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryMarketplace {
    async fn preferred_companies(&self, store_id: Uuid) -> Result<Vec<DeliveryCompany>, BoxError> {
        let state = lock(&self.state);
        let mut ranked: Vec<&(Uuid, Uuid, i32)> =
            state.preferences.iter().filter(|(s, _, _)| *s == store_id).collect();
        ranked.sort_by_key(|(_, _, rank)| *rank);
        Ok(ranked
            .into_iter()
            .filter_map(|(_, company_id, _)| {
                state.companies.iter().find(|c| c.id == *company_id).cloned()
            })
            .collect())
    }

    async fn active_companies(&self) -> Result<Vec<DeliveryCompany>, BoxError> {
        Ok(lock(&self.state)
            .companies
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn create_delivery(&self, delivery: &NewDelivery) -> Result<Uuid, BoxError> {
        let mut state = lock(&self.state);
        if state.failures.deliveries {
            return Err("deliveries insert failed".into());
        }
        state.deliveries.push(delivery.clone());
        Ok(delivery.id)
    }

    async fn auto_assign_driver(&self, delivery_id: Uuid) -> Result<Option<Uuid>, BoxError> {
        let mut state = lock(&self.state);
        if state.failures.driver_assignment {
            return Err("driver assignment service unavailable".into());
        }
        let Some(company_id) = state
            .deliveries
            .iter()
            .find(|d| d.id == delivery_id)
            .map(|d| d.delivery_company_id)
        else {
            return Err(format!("delivery {} not found", delivery_id).into());
        };
        let driver = state
            .drivers
            .iter()
            .find(|(driver, company)| *company == company_id && !state.busy_drivers.contains(driver))
            .map(|(driver, _)| *driver);
        if let Some(driver) = driver {
            state.busy_drivers.insert(driver);
            if let Some(delivery) = state.deliveries.iter_mut().find(|d| d.id == delivery_id) {
                delivery.status = "assigned".to_string();
            }
        }
        Ok(driver)
    }
}

#[async_trait]
impl NotificationService for InMemoryMarketplace {
    async fn notify_store_owners(
        &self,
        store_id: Uuid,
        notification: &Notification,
    ) -> Result<usize, BoxError> {
        let mut state = lock(&self.state);
        if state.failures.notifications {
            return Err("notification service unavailable".into());
        }
        let owners = state.owner_counts.get(&store_id).copied().unwrap_or(1);
        for _ in 0..owners {
            state.notifications.push((store_id, notification.clone()));
        }
        Ok(owners)
    }
}
