use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Cents;
use crate::BoxError;

/// A seller as seen by checkout: payout routing and delivery pricing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreProfile {
    pub id: Uuid,
    pub name: String,
    pub tenant_id: Option<Uuid>,
    /// Connected payment account receiving this store's funds
    pub payout_account_id: Option<String>,
    pub delivery_fee_cents: Option<Cents>,
    pub free_delivery_threshold_cents: Option<Cents>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreLocation {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: Option<String>,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub store_id: Uuid,
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub delivery_fee_cents: Cents,
    pub platform_fee_cents: Cents,
    pub total_cents: Cents,
    pub status: OrderStatus,
    pub payment_status: String,
    pub payment_method: String,
    pub stripe_payment_intent_id: String,
    pub shipping_address: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub inventory_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: Cents,
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub total_cents: Cents,
}

/// An order already persisted for a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub order_number: String,
    pub store_id: Uuid,
    pub total_cents: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An order for this (payment intent, store) pair already exists
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryCompany {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDelivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub delivery_company_id: Uuid,
    pub pickup_address: serde_json::Value,
    pub dropoff_address: serde_json::Value,
    pub delivery_fee_cents: Cents,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub order_id: Uuid,
    pub store_id: Uuid,
}

/// Store lookups used while partitioning a cart and dispatching deliveries
#[async_trait]
pub trait StoreDirectory: Send + Sync {
    async fn get_stores(&self, ids: &[Uuid]) -> Result<Vec<StoreProfile>, BoxError>;

    async fn primary_location(&self, store_id: Uuid) -> Result<Option<StoreLocation>, BoxError>;
}

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Vec<OrderRecord>, BoxError>;

    /// Insert guarded by the unique (payment intent, store) key
    async fn insert_order(&self, order: &NewOrder) -> Result<InsertOutcome, BoxError>;

    async fn insert_order_items(&self, items: &[NewOrderItem]) -> Result<(), BoxError>;
}

#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Active companies the store prefers, best rank first
    async fn preferred_companies(&self, store_id: Uuid) -> Result<Vec<DeliveryCompany>, BoxError>;

    async fn active_companies(&self) -> Result<Vec<DeliveryCompany>, BoxError>;

    async fn create_delivery(&self, delivery: &NewDelivery) -> Result<Uuid, BoxError>;

    /// Returns the assigned driver, if one was available
    async fn auto_assign_driver(&self, delivery_id: Uuid) -> Result<Option<Uuid>, BoxError>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Notify every owner-role member of the store's tenant; returns how many were notified
    async fn notify_store_owners(
        &self,
        store_id: Uuid,
        notification: &Notification,
    ) -> Result<usize, BoxError>;
}
