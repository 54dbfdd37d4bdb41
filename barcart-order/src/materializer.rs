use barcart_core::inventory::{DecrementOutcome, InventoryService};
use barcart_core::money::cents_to_dollars;
use barcart_core::payment::{is_payment_intent_id, PaymentIntent, PaymentProvider, PaymentStatus};
use barcart_core::pricing::FeeCalculator;
use barcart_core::repository::{
    DeliveryRepository, InsertOutcome, NewOrder, NewOrderItem, Notification, NotificationService,
    OrderRepository, OrderStatus, StoreDirectory,
};
use barcart_core::{validate_cart, Cents};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::CheckoutError;
use crate::fulfillment::DeliveryDispatcher;
use crate::metadata::{decode_breakdown, BreakdownEntry};
use crate::models::{
    generate_order_number, group_by_store, ConfirmOrderRequest, CreatedOrder,
    MaterializationReport, SideEffectOutcome, StoreGroup, StoreOutcome,
};
use crate::settlement::settle_transfers;

/// Turns a succeeded payment intent into per-store orders and fans out the
/// follow-up work (items, stock, delivery, notification, transfers).
pub struct OrderMaterializer {
    provider: Option<Arc<dyn PaymentProvider>>,
    fees: Arc<dyn FeeCalculator>,
    stores: Arc<dyn StoreDirectory>,
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
    dispatcher: DeliveryDispatcher,
    notifications: Arc<dyn NotificationService>,
}

impl OrderMaterializer {
    pub fn new(
        provider: Option<Arc<dyn PaymentProvider>>,
        fees: Arc<dyn FeeCalculator>,
        stores: Arc<dyn StoreDirectory>,
        orders: Arc<dyn OrderRepository>,
        inventory: Arc<dyn InventoryService>,
        deliveries: Arc<dyn DeliveryRepository>,
        notifications: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            provider,
            fees,
            stores,
            orders,
            inventory,
            dispatcher: DeliveryDispatcher::new(deliveries),
            notifications,
        }
    }

    #[instrument(skip_all, fields(payment_intent = %request.payment_intent_id, items = request.items.len()))]
    pub async fn confirm_order(
        &self,
        request: &ConfirmOrderRequest,
    ) -> Result<MaterializationReport, CheckoutError> {
        let provider = self.provider.as_ref().ok_or(CheckoutError::PaymentNotConfigured)?;
        if request.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        validate_cart(&request.items)?;
        if !is_payment_intent_id(&request.payment_intent_id) {
            return Err(CheckoutError::InvalidPaymentIntent);
        }

        let intent = provider.get_intent(&request.payment_intent_id).await?;
        if intent.status != PaymentStatus::Succeeded {
            warn!(status = intent.status.as_str(), "confirm-order on unpaid intent");
            return Err(CheckoutError::PaymentNotCompleted {
                status: intent.status,
            });
        }

        let existing = self
            .orders
            .find_by_payment_intent(&intent.id)
            .await
            .map_err(|e| CheckoutError::Internal(format!("order lookup failed: {}", e)))?;
        if !existing.is_empty() {
            warn!(orders = existing.len(), "payment intent already materialized");
            return Err(CheckoutError::AlreadyMaterialized {
                payment_intent_id: intent.id,
                order_ids: existing.into_iter().map(|o| o.id).collect(),
            });
        }

        let breakdown = decode_breakdown(&intent.metadata).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable store breakdown in intent metadata");
            Vec::new()
        });

        let mut groups = group_by_store(&request.items);
        for group in groups.iter_mut() {
            group.tax_cents = group.items.iter().map(|i| i.client_tax_cents()).sum();
            group.delivery_fee_cents = group.items.iter().map(|i| i.client_shipping_cents()).sum();
            group.recompute_total();
            check_against_breakdown(group, &breakdown);
        }

        let buyer_state = request.shipping_address.state_code();
        let mut orders = Vec::new();
        let mut stores = Vec::with_capacity(groups.len());
        for group in &groups {
            let (outcome, created) = self
                .materialize_store(&intent, request, group, buyer_state.as_deref())
                .await;
            stores.push(outcome);
            orders.extend(created);
        }

        let transfers = settle_transfers(
            &**provider,
            &*self.fees,
            &intent,
            &breakdown,
            buyer_state.as_deref(),
        )
        .await;

        let report = MaterializationReport {
            payment_intent_id: intent.id,
            orders,
            stores,
            transfers,
        };
        info!(
            orders = report.orders.len(),
            failed_stores = report.failed_stores().len(),
            transfers = report.transfers.len(),
            "orders materialized"
        );
        Ok(report)
    }

    async fn materialize_store(
        &self,
        intent: &PaymentIntent,
        request: &ConfirmOrderRequest,
        group: &StoreGroup,
        buyer_state: Option<&str>,
    ) -> (StoreOutcome, Option<CreatedOrder>) {
        let Some(store_id) = group.store_id else {
            warn!(store_name = %group.store_name, "items without a store; no order created");
            return (StoreOutcome::order_failed(group, "store could not be resolved"), None);
        };

        let platform_fee_cents = match self.fees.platform_fee(group.total_cents, buyer_state).await {
            Ok(quote) => quote.commission_cents,
            Err(e) => {
                error!(store = %store_id, error = %e, "platform fee calculation failed; recording 0");
                0
            }
        };

        let pickup = self.stores.primary_location(store_id).await.unwrap_or_else(|e| {
            warn!(store = %store_id, error = %e, "primary location lookup failed");
            None
        });

        let order = NewOrder {
            id: Uuid::new_v4(),
            order_number: generate_order_number(),
            customer_id: request.customer_id,
            store_id,
            subtotal_cents: group.subtotal_cents,
            tax_cents: group.tax_cents,
            delivery_fee_cents: group.delivery_fee_cents,
            platform_fee_cents,
            total_cents: group.total_cents,
            status: OrderStatus::Confirmed,
            payment_status: "paid".to_string(),
            payment_method: "card".to_string(),
            stripe_payment_intent_id: intent.id.clone(),
            shipping_address: serde_json::to_value(&request.shipping_address).unwrap_or_default(),
            created_at: Utc::now(),
        };

        match self.orders.insert_order(&order).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::Duplicate) => {
                warn!(store = %store_id, "order already recorded for this payment");
                return (
                    StoreOutcome::order_failed(group, "order already exists for this payment"),
                    None,
                );
            }
            Err(e) => {
                error!(store = %store_id, error = %e, "failed to create order");
                return (StoreOutcome::order_failed(group, e), None);
            }
        }

        let order_items = self.insert_items(&order, group).await;
        let inventory = self.decrement_stock(group).await;
        let dispatch = self
            .dispatcher
            .dispatch(&order, pickup.as_ref(), &request.shipping_address)
            .await;
        let notification = self.notify(&order, group).await;

        let outcome = StoreOutcome {
            store_id: Some(store_id),
            store_name: group.store_name.clone(),
            order_id: Some(order.id),
            order: SideEffectOutcome::Ok,
            order_items,
            inventory,
            delivery: dispatch.delivery,
            driver_assignment: dispatch.driver_assignment,
            notification,
        };
        let created = CreatedOrder {
            id: order.id,
            order_number: order.order_number,
            store_id,
            store_name: group.store_name.clone(),
            total_cents: order.total_cents,
            delivery_id: dispatch.delivery_id,
        };
        (outcome, Some(created))
    }

    async fn insert_items(&self, order: &NewOrder, group: &StoreGroup) -> SideEffectOutcome {
        let rows: Vec<NewOrderItem> = group
            .items
            .iter()
            .map(|item| {
                let subtotal_cents = item.line_subtotal_cents();
                let tax_cents = item.client_tax_cents();
                NewOrderItem {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    inventory_id: item.id,
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents(),
                    subtotal_cents,
                    tax_cents,
                    total_cents: subtotal_cents + tax_cents,
                }
            })
            .collect();

        match self.orders.insert_order_items(&rows).await {
            Ok(()) => SideEffectOutcome::Ok,
            Err(e) => {
                error!(order = %order.id, error = %e, "failed to insert order items");
                SideEffectOutcome::failed(e)
            }
        }
    }

    async fn decrement_stock(&self, group: &StoreGroup) -> SideEffectOutcome {
        let mut problems = Vec::new();
        for item in &group.items {
            match self.inventory.reserve_and_decrement(item.id, item.quantity).await {
                Ok(DecrementOutcome::Decremented { .. }) => {}
                Ok(DecrementOutcome::Insufficient { available }) => {
                    problems.push(format!(
                        "{}: requested {}, only {} in stock",
                        item.product_name, item.quantity, available
                    ));
                }
                Ok(DecrementOutcome::NotFound) => {
                    problems.push(format!("{}: inventory row not found", item.product_name));
                }
                Err(e) => problems.push(format!("{}: {}", item.product_name, e)),
            }
        }

        if problems.is_empty() {
            SideEffectOutcome::Ok
        } else {
            error!(problems = ?problems, "inventory decrement incomplete");
            SideEffectOutcome::failed(problems.join("; "))
        }
    }

    async fn notify(&self, order: &NewOrder, group: &StoreGroup) -> SideEffectOutcome {
        let notification = Notification {
            kind: "new_order".to_string(),
            title: format!("New order {}", order.order_number),
            message: format!(
                "{} item(s) totalling ${:.2}",
                group.items.iter().map(|i| i.quantity).sum::<u32>(),
                cents_to_dollars(order.total_cents)
            ),
            order_id: order.id,
            store_id: order.store_id,
        };

        match self.notifications.notify_store_owners(order.store_id, &notification).await {
            Ok(0) => SideEffectOutcome::skipped("store has no owners to notify"),
            Ok(_) => SideEffectOutcome::Ok,
            Err(e) => {
                warn!(order = %order.id, error = %e, "store notification failed");
                SideEffectOutcome::failed(e)
            }
        }
    }
}

/// Client values are kept; drift from what was charged is only logged.
fn check_against_breakdown(group: &StoreGroup, breakdown: &[BreakdownEntry]) {
    let Some(charged) = breakdown
        .iter()
        .find(|entry| entry.store_id.is_some() && entry.store_id == group.store_id)
        .map(|entry| entry.total_cents)
    else {
        return;
    };
    if charged != group.total_cents {
        let drift: Cents = group.total_cents - charged;
        warn!(
            store = ?group.store_id,
            charged_cents = charged,
            submitted_cents = group.total_cents,
            drift_cents = drift,
            "submitted store total differs from the amount charged"
        );
    }
}
