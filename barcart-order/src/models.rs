use barcart_core::cart::lenient_uuid;
use barcart_core::{CartItem, Cents, ShippingAddress};
use barcart_shared::Masked;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const UNKNOWN_STORE_NAME: &str = "Unknown Store";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    #[serde(default, deserialize_with = "lenient_uuid")]
    pub customer_id: Option<Uuid>,
    pub customer_email: Masked<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderRequest {
    pub payment_intent_id: String,
    #[serde(default, deserialize_with = "lenient_uuid")]
    pub customer_id: Option<Uuid>,
    pub shipping_address: ShippingAddress,
    pub items: Vec<CartItem>,
}

/// The per-store slice of a multi-store cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreGroup {
    pub store_id: Option<Uuid>,
    pub store_name: String,
    pub payout_account_id: Option<String>,
    pub items: Vec<CartItem>,
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub delivery_fee_cents: Cents,
    pub total_cents: Cents,
}

impl StoreGroup {
    pub fn new(store_id: Option<Uuid>, store_name: String) -> Self {
        Self {
            store_id,
            store_name,
            payout_account_id: None,
            items: Vec::new(),
            subtotal_cents: 0,
            tax_cents: 0,
            delivery_fee_cents: 0,
            total_cents: 0,
        }
    }

    pub fn add_item(&mut self, item: CartItem) {
        self.subtotal_cents = self.subtotal_cents.saturating_add(item.line_subtotal_cents());
        self.items.push(item);
    }

    pub fn recompute_total(&mut self) {
        self.total_cents = self.subtotal_cents + self.tax_cents + self.delivery_fee_cents;
    }
}

/// Group items by store, keeping the order in which stores first appear.
pub fn group_by_store(items: &[CartItem]) -> Vec<StoreGroup> {
    let mut groups: Vec<StoreGroup> = Vec::new();
    for item in items {
        let position = groups.iter().position(|g| g.store_id == item.store_id);
        let group = match position {
            Some(idx) => &mut groups[idx],
            None => {
                let name = item
                    .store_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_STORE_NAME.to_string());
                groups.push(StoreGroup::new(item.store_id, name));
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        group.add_item(item.clone());
    }
    groups
}

/// Result of one best-effort step during order materialization.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SideEffectOutcome {
    Ok,
    Failed { reason: String },
    Skipped { reason: String },
}

impl SideEffectOutcome {
    pub fn failed(reason: impl fmt::Display) -> Self {
        SideEffectOutcome::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn skipped(reason: impl fmt::Display) -> Self {
        SideEffectOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SideEffectOutcome::Ok)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SideEffectOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub id: Uuid,
    pub order_number: String,
    pub store_id: Uuid,
    pub store_name: String,
    pub total_cents: Cents,
    pub delivery_id: Option<Uuid>,
}

/// Everything that happened for one store during materialization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOutcome {
    pub store_id: Option<Uuid>,
    pub store_name: String,
    pub order_id: Option<Uuid>,
    pub order: SideEffectOutcome,
    pub order_items: SideEffectOutcome,
    pub inventory: SideEffectOutcome,
    pub delivery: SideEffectOutcome,
    pub driver_assignment: SideEffectOutcome,
    pub notification: SideEffectOutcome,
}

impl StoreOutcome {
    pub fn order_failed(group: &StoreGroup, reason: impl fmt::Display) -> Self {
        let not_attempted = || SideEffectOutcome::skipped("order was not created");
        Self {
            store_id: group.store_id,
            store_name: group.store_name.clone(),
            order_id: None,
            order: SideEffectOutcome::failed(reason),
            order_items: not_attempted(),
            inventory: not_attempted(),
            delivery: not_attempted(),
            driver_assignment: not_attempted(),
            notification: not_attempted(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub store_id: Option<Uuid>,
    pub amount_cents: Cents,
    pub transfer_id: Option<String>,
    pub outcome: SideEffectOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationReport {
    pub payment_intent_id: String,
    pub orders: Vec<CreatedOrder>,
    pub stores: Vec<StoreOutcome>,
    pub transfers: Vec<TransferOutcome>,
}

impl MaterializationReport {
    pub fn failed_stores(&self) -> Vec<&StoreOutcome> {
        self.stores.iter().filter(|s| s.order.is_failed()).collect()
    }

    pub fn message(&self) -> String {
        let failed = self.failed_stores().len();
        if failed == 0 {
            format!("Successfully created {} order(s)", self.orders.len())
        } else {
            format!(
                "Created {} of {} order(s); {} store(s) failed",
                self.orders.len(),
                self.stores.len(),
                failed
            )
        }
    }
}

/// Human-facing order number, e.g. `BC-261019-7KQ2XM`.
pub fn generate_order_number() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("BC-{}-{}", Utc::now().format("%y%m%d"), suffix)
}
