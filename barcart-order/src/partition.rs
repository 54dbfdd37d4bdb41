use barcart_core::inventory::{InventoryRequest, InventoryService};
use barcart_core::pricing::{TaxCalculator, TaxQuote};
use barcart_core::repository::{StoreDirectory, StoreProfile};
use barcart_core::{validate_cart, CartItem, Cents, ShippingAddress};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::allocation::allocate_proportionally;
use crate::error::{CheckoutError, UnavailableItem};
use crate::models::{group_by_store, StoreGroup, UNKNOWN_STORE_NAME};

pub const DEFAULT_DELIVERY_FEE_CENTS: Cents = 499;

/// A cart split into per-store groups with authoritative totals.
#[derive(Debug, Clone)]
pub struct PartitionedCart {
    pub groups: Vec<StoreGroup>,
    pub subtotal_cents: Cents,
    pub tax: TaxQuote,
    pub shipping_cents: Cents,
    pub total_cents: Cents,
}

/// Splits a cart into per-store groups and prices each group.
pub struct CartPartitioner {
    stores: Arc<dyn StoreDirectory>,
    inventory: Arc<dyn InventoryService>,
    tax: Arc<dyn TaxCalculator>,
    default_delivery_fee_cents: Cents,
}

impl CartPartitioner {
    pub fn new(
        stores: Arc<dyn StoreDirectory>,
        inventory: Arc<dyn InventoryService>,
        tax: Arc<dyn TaxCalculator>,
    ) -> Self {
        Self {
            stores,
            inventory,
            tax,
            default_delivery_fee_cents: DEFAULT_DELIVERY_FEE_CENTS,
        }
    }

    pub fn with_default_delivery_fee(mut self, fee_cents: Cents) -> Self {
        self.default_delivery_fee_cents = fee_cents;
        self
    }

    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn partition(
        &self,
        items: &[CartItem],
        address: &ShippingAddress,
    ) -> Result<PartitionedCart, CheckoutError> {
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        validate_cart(items)?;

        self.check_availability(items).await?;

        let mut groups = group_by_store(items);
        let profiles = self.load_profiles(&groups).await?;

        for group in groups.iter_mut() {
            match group.store_id.and_then(|id| profiles.get(&id)) {
                Some(profile) => {
                    group.store_name = profile.name.clone();
                    group.payout_account_id = profile.payout_account_id.clone();
                }
                None => {
                    group.store_name = UNKNOWN_STORE_NAME.to_string();
                    group.payout_account_id = None;
                }
            }
        }

        let subtotal_cents: Cents = groups.iter().map(|g| g.subtotal_cents).sum();

        let tax = self
            .tax
            .calculate(items, subtotal_cents, address)
            .await
            .map_err(|e| CheckoutError::TaxCalculation(e.to_string()))?;

        let weights: Vec<Cents> = groups.iter().map(|g| g.subtotal_cents).collect();
        let portions = allocate_proportionally(tax.tax_cents, &weights);

        for (group, portion) in groups.iter_mut().zip(portions) {
            let profile = group.store_id.and_then(|id| profiles.get(&id));
            group.tax_cents = portion;
            group.delivery_fee_cents =
                resolve_delivery_fee(profile, group.subtotal_cents, self.default_delivery_fee_cents);
            group.recompute_total();
        }

        let shipping_cents: Cents = groups.iter().map(|g| g.delivery_fee_cents).sum();
        let total_cents = subtotal_cents + tax.tax_cents + shipping_cents;

        debug!(
            stores = groups.len(),
            subtotal_cents, shipping_cents, total_cents, "cart partitioned"
        );

        Ok(PartitionedCart {
            groups,
            subtotal_cents,
            tax,
            shipping_cents,
            total_cents,
        })
    }

    /// Fails the checkout when any line asks for more than is in stock. If the
    /// inventory service itself is unreachable the check is skipped.
    async fn check_availability(&self, items: &[CartItem]) -> Result<(), CheckoutError> {
        let mut requested: Vec<InventoryRequest> = Vec::new();
        for item in items {
            match requested.iter_mut().find(|r| r.inventory_id == item.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity)
                }
                None => requested.push(InventoryRequest {
                    inventory_id: item.id,
                    quantity: item.quantity,
                }),
            }
        }

        let levels = match self.inventory.check_availability(&requested).await {
            Ok(levels) => levels,
            Err(e) => {
                warn!(error = %e, "inventory availability check failed; continuing without it");
                return Ok(());
            }
        };
        let available: HashMap<Uuid, i64> =
            levels.into_iter().map(|l| (l.inventory_id, l.available)).collect();

        let unavailable: Vec<UnavailableItem> = requested
            .iter()
            .filter_map(|req| {
                let in_stock = available.get(&req.inventory_id).copied().unwrap_or(0);
                if in_stock < i64::from(req.quantity) {
                    let product_name = items
                        .iter()
                        .find(|i| i.id == req.inventory_id)
                        .map(|i| i.product_name.clone())
                        .unwrap_or_default();
                    Some(UnavailableItem {
                        product_name,
                        available: in_stock.max(0),
                        requested: req.quantity,
                    })
                } else {
                    None
                }
            })
            .collect();

        if unavailable.is_empty() {
            Ok(())
        } else {
            Err(CheckoutError::InsufficientInventory(unavailable))
        }
    }

    async fn load_profiles(
        &self,
        groups: &[StoreGroup],
    ) -> Result<HashMap<Uuid, StoreProfile>, CheckoutError> {
        let ids: Vec<Uuid> = groups.iter().filter_map(|g| g.store_id).collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let profiles = self
            .stores
            .get_stores(&ids)
            .await
            .map_err(|e| CheckoutError::StoreLookup(e.to_string()))?;
        Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
    }
}

/// Free above the store's threshold, otherwise its flat fee, otherwise the default.
pub fn resolve_delivery_fee(
    store: Option<&StoreProfile>,
    subtotal_cents: Cents,
    default_fee_cents: Cents,
) -> Cents {
    let Some(store) = store else {
        return default_fee_cents;
    };
    if let Some(threshold) = store.free_delivery_threshold_cents {
        if subtotal_cents >= threshold {
            return 0;
        }
    }
    store.delivery_fee_cents.unwrap_or(default_fee_cents)
}
