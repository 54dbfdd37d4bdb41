use axum::{extract::State, routing::post, Json, Router};
use barcart_core::money::cents_to_dollars;
use barcart_order::models::{StoreOutcome, TransferOutcome};
use barcart_order::{ConfirmOrderRequest, CreatedOrder, MaterializationReport, SideEffectOutcome};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/confirm-order", post(confirm_order))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummaryResponse {
    pub id: Uuid,
    pub order_number: String,
    pub store_id: Uuid,
    pub store_name: String,
    pub total: f64,
    pub delivery_id: Option<Uuid>,
}

impl From<CreatedOrder> for OrderSummaryResponse {
    fn from(o: CreatedOrder) -> Self {
        Self {
            id: o.id,
            order_number: o.order_number,
            store_id: o.store_id,
            store_name: o.store_name,
            total: cents_to_dollars(o.total_cents),
            delivery_id: o.delivery_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub store_id: Option<Uuid>,
    pub amount: f64,
    pub transfer_id: Option<String>,
    pub outcome: SideEffectOutcome,
}

impl From<TransferOutcome> for TransferResponse {
    fn from(t: TransferOutcome) -> Self {
        Self {
            store_id: t.store_id,
            amount: cents_to_dollars(t.amount_cents),
            transfer_id: t.transfer_id,
            outcome: t.outcome,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderResponse {
    pub success: bool,
    pub orders: Vec<OrderSummaryResponse>,
    pub payment_intent_id: String,
    pub message: String,
    pub stores: Vec<StoreOutcome>,
    pub transfers: Vec<TransferResponse>,
    /// Stores whose order row could not be created
    pub failed_stores: Vec<Option<Uuid>>,
}

impl From<MaterializationReport> for ConfirmOrderResponse {
    fn from(report: MaterializationReport) -> Self {
        let message = report.message();
        let failed_stores = report.failed_stores().iter().map(|s| s.store_id).collect();
        Self {
            success: true,
            orders: report.orders.into_iter().map(OrderSummaryResponse::from).collect(),
            payment_intent_id: report.payment_intent_id,
            message,
            stores: report.stores,
            transfers: report.transfers.into_iter().map(TransferResponse::from).collect(),
            failed_stores,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /confirm-order
/// Materialize per-store orders once the payment intent has succeeded
pub async fn confirm_order(
    State(state): State<AppState>,
    Json(req): Json<ConfirmOrderRequest>,
) -> Result<Json<ConfirmOrderResponse>, AppError> {
    let report = state.materializer.confirm_order(&req).await?;
    metrics::record_materialization(&report);
    Ok(Json(report.into()))
}
