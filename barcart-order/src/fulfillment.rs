use barcart_core::repository::{
    DeliveryCompany, DeliveryRepository, NewDelivery, NewOrder, StoreLocation,
};
use barcart_core::{BoxError, ShippingAddress};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::SideEffectOutcome;

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub delivery_id: Option<Uuid>,
    pub delivery: SideEffectOutcome,
    pub driver_assignment: SideEffectOutcome,
}

/// Creates the delivery for a freshly created order and tries to hand it to a driver.
pub struct DeliveryDispatcher {
    deliveries: Arc<dyn DeliveryRepository>,
}

impl DeliveryDispatcher {
    pub fn new(deliveries: Arc<dyn DeliveryRepository>) -> Self {
        Self { deliveries }
    }

    /// The store's best-ranked active partner, else any active company
    pub async fn select_company(&self, store_id: Uuid) -> Result<Option<DeliveryCompany>, BoxError> {
        match self.deliveries.preferred_companies(store_id).await {
            Ok(preferred) => {
                if let Some(company) = preferred.into_iter().find(|c| c.is_active) {
                    return Ok(Some(company));
                }
            }
            Err(e) => {
                warn!(store = %store_id, error = %e, "failed to load delivery preferences");
            }
        }

        let active = self.deliveries.active_companies().await?;
        Ok(active.into_iter().find(|c| c.is_active))
    }

    pub async fn dispatch(
        &self,
        order: &NewOrder,
        pickup: Option<&StoreLocation>,
        dropoff: &ShippingAddress,
    ) -> DispatchReport {
        let company = match self.select_company(order.store_id).await {
            Ok(Some(company)) => company,
            Ok(None) => {
                info!(order = %order.id, "no active delivery company; order left unassigned");
                return DispatchReport {
                    delivery_id: None,
                    delivery: SideEffectOutcome::skipped("no active delivery company"),
                    driver_assignment: SideEffectOutcome::skipped("no delivery created"),
                };
            }
            Err(e) => {
                warn!(order = %order.id, error = %e, "delivery company lookup failed");
                return DispatchReport {
                    delivery_id: None,
                    delivery: SideEffectOutcome::failed(e),
                    driver_assignment: SideEffectOutcome::skipped("no delivery created"),
                };
            }
        };

        let delivery = NewDelivery {
            id: Uuid::new_v4(),
            order_id: order.id,
            store_id: order.store_id,
            delivery_company_id: company.id,
            pickup_address: pickup_json(pickup),
            dropoff_address: serde_json::to_value(dropoff).unwrap_or_default(),
            delivery_fee_cents: order.delivery_fee_cents,
            status: "pending".to_string(),
        };

        let delivery_id = match self.deliveries.create_delivery(&delivery).await {
            Ok(id) => id,
            Err(e) => {
                warn!(order = %order.id, error = %e, "failed to create delivery");
                return DispatchReport {
                    delivery_id: None,
                    delivery: SideEffectOutcome::failed(e),
                    driver_assignment: SideEffectOutcome::skipped("no delivery created"),
                };
            }
        };

        let driver_assignment = match self.deliveries.auto_assign_driver(delivery_id).await {
            Ok(Some(driver)) => {
                info!(delivery = %delivery_id, driver = %driver, "driver auto-assigned");
                SideEffectOutcome::Ok
            }
            Ok(None) => SideEffectOutcome::skipped("no driver available"),
            Err(e) => {
                warn!(delivery = %delivery_id, error = %e, "driver auto-assignment failed");
                SideEffectOutcome::failed(e)
            }
        };

        DispatchReport {
            delivery_id: Some(delivery_id),
            delivery: SideEffectOutcome::Ok,
            driver_assignment,
        }
    }
}

fn pickup_json(location: Option<&StoreLocation>) -> serde_json::Value {
    match location {
        Some(loc) => serde_json::json!({
            "locationId": loc.id,
            "name": loc.name,
            "street": loc.address_line,
            "city": loc.city,
            "state": loc.state,
            "zipCode": loc.zip_code,
            "latitude": loc.latitude,
            "longitude": loc.longitude,
        }),
        None => serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{delivery_company, new_order, InMemoryMarketplace};

    #[tokio::test]
    async fn test_preferred_company_wins() {
        let market = Arc::new(InMemoryMarketplace::new());
        let store = Uuid::new_v4();
        let fallback = market.add_company(delivery_company("Anyone Couriers", true));
        let preferred = market.add_company(delivery_company("Preferred Couriers", true));
        market.prefer_company(store, preferred, 1);

        let dispatcher = DeliveryDispatcher::new(market.clone());
        let chosen = dispatcher.select_company(store).await.unwrap().unwrap();
        assert_eq!(chosen.id, preferred);
        assert_ne!(chosen.id, fallback);
    }

    #[tokio::test]
    async fn test_inactive_preference_falls_back_to_any_active() {
        let market = Arc::new(InMemoryMarketplace::new());
        let store = Uuid::new_v4();
        let retired = market.add_company(delivery_company("Retired Couriers", false));
        market.prefer_company(store, retired, 1);
        let active = market.add_company(delivery_company("Active Couriers", true));

        let dispatcher = DeliveryDispatcher::new(market.clone());
        assert_eq!(dispatcher.select_company(store).await.unwrap().unwrap().id, active);
    }

    #[tokio::test]
    async fn test_no_company_skips_delivery() {
        let market = Arc::new(InMemoryMarketplace::new());
        let order = new_order(Uuid::new_v4());

        let report = DeliveryDispatcher::new(market.clone())
            .dispatch(&order, None, &ShippingAddress::default())
            .await;

        assert!(report.delivery_id.is_none());
        assert!(matches!(report.delivery, SideEffectOutcome::Skipped { .. }));
        assert!(market.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_driver_is_assigned_when_available() {
        let market = Arc::new(InMemoryMarketplace::new());
        let company = market.add_company(delivery_company("Couriers", true));
        market.add_driver(company);
        let order = new_order(Uuid::new_v4());

        let report = DeliveryDispatcher::new(market.clone())
            .dispatch(&order, None, &ShippingAddress::default())
            .await;

        assert!(report.delivery.is_ok());
        assert!(report.driver_assignment.is_ok());
        assert_eq!(market.deliveries()[0].delivery_company_id, company);
    }

    #[tokio::test]
    async fn test_delivery_insert_failure_is_reported() {
        let market = Arc::new(InMemoryMarketplace::new());
        let company = market.add_company(delivery_company("Couriers", true));
        market.add_driver(company);
        market.fail_deliveries();
        let order = new_order(Uuid::new_v4());

        let report = DeliveryDispatcher::new(market.clone())
            .dispatch(&order, None, &ShippingAddress::default())
            .await;

        assert!(report.delivery_id.is_none());
        assert!(report.delivery.is_failed());
        assert!(matches!(report.driver_assignment, SideEffectOutcome::Skipped { .. }));
        assert!(market.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_driver_assignment_error_keeps_the_delivery() {
        let market = Arc::new(InMemoryMarketplace::new());
        let company = market.add_company(delivery_company("Couriers", true));
        market.add_driver(company);
        market.fail_driver_assignment();
        let order = new_order(Uuid::new_v4());

        let report = DeliveryDispatcher::new(market.clone())
            .dispatch(&order, None, &ShippingAddress::default())
            .await;

        assert!(report.delivery.is_ok());
        assert!(report.driver_assignment.is_failed());
        assert_eq!(report.delivery_id, Some(market.deliveries()[0].id));
        assert_eq!(market.deliveries()[0].status, "pending");
    }
}
