use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BoxError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryRequest {
    pub inventory_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryLevel {
    pub inventory_id: Uuid,
    pub available: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    Decremented { remaining: i64 },
    Insufficient { available: i64 },
    NotFound,
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Current stock for each requested row. Rows that do not exist are omitted.
    async fn check_availability(
        &self,
        requests: &[InventoryRequest],
    ) -> Result<Vec<InventoryLevel>, BoxError>;

    /// Atomically remove `quantity` units if at least that many are in stock.
    async fn reserve_and_decrement(
        &self,
        inventory_id: Uuid,
        quantity: u32,
    ) -> Result<DecrementOutcome, BoxError>;
}
