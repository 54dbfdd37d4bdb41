use axum::{extract::State, routing::post, Json, Router};
use barcart_core::money::cents_to_dollars;
use barcart_core::pricing::{FeeBreakdown, FeeSource, TaxLine};
use barcart_order::{CheckoutRequest, CheckoutSummary};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxLineResponse {
    pub name: String,
    pub rate: f64,
    pub amount: f64,
}

impl From<&TaxLine> for TaxLineResponse {
    fn from(line: &TaxLine) -> Self {
        Self {
            name: line.name.clone(),
            rate: line.rate,
            amount: cents_to_dollars(line.amount_cents),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdownResponse {
    pub source: FeeSource,
    pub state: Option<String>,
    pub commission_percent: f64,
    pub commission_amount: f64,
    pub fixed_fee: f64,
}

impl From<&FeeBreakdown> for FeeBreakdownResponse {
    fn from(b: &FeeBreakdown) -> Self {
        Self {
            source: b.source,
            state: b.state.clone(),
            commission_percent: b.percent,
            commission_amount: cents_to_dollars(b.percent_cents),
            fixed_fee: cents_to_dollars(b.fixed_cents),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreBreakdownResponse {
    pub store_id: Option<Uuid>,
    pub store_name: String,
    pub item_count: usize,
    pub subtotal: f64,
    pub tax: f64,
    pub delivery_fee: f64,
    pub total: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub subtotal: f64,
    pub taxes: f64,
    pub tax_rate: f64,
    pub tax_breakdown: Vec<TaxLineResponse>,
    pub shipping: f64,
    pub total_amount: f64,
    pub platform_fee: f64,
    pub platform_fee_breakdown: FeeBreakdownResponse,
    pub store_breakdown: Vec<StoreBreakdownResponse>,
    pub transfer_group: String,
}

impl From<CheckoutSummary> for CheckoutResponse {
    fn from(s: CheckoutSummary) -> Self {
        let cart = &s.cart;
        Self {
            subtotal: cents_to_dollars(cart.subtotal_cents),
            taxes: cents_to_dollars(cart.tax.tax_cents),
            tax_rate: cart.tax.rate,
            tax_breakdown: cart.tax.breakdown.iter().map(TaxLineResponse::from).collect(),
            shipping: cents_to_dollars(cart.shipping_cents),
            total_amount: cents_to_dollars(cart.total_cents),
            platform_fee: cents_to_dollars(s.platform_fee.commission_cents),
            platform_fee_breakdown: FeeBreakdownResponse::from(&s.platform_fee.breakdown),
            store_breakdown: cart
                .groups
                .iter()
                .map(|g| StoreBreakdownResponse {
                    store_id: g.store_id,
                    store_name: g.store_name.clone(),
                    item_count: g.items.len(),
                    subtotal: cents_to_dollars(g.subtotal_cents),
                    tax: cents_to_dollars(g.tax_cents),
                    delivery_fee: cents_to_dollars(g.delivery_fee_cents),
                    total: cents_to_dollars(g.total_cents),
                })
                .collect(),
            client_secret: s.client_secret,
            payment_intent_id: s.payment_intent_id,
            transfer_group: s.transfer_group,
        }
    }
}

/// POST /checkout
/// Partition the cart by store and open a payment intent for the total
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    match state.checkout.begin_checkout(&req).await {
        Ok(summary) => {
            metrics::record_checkout("created");
            Ok(Json(summary.into()))
        }
        Err(e) => {
            metrics::record_checkout(metrics::checkout_outcome(&e));
            Err(e.into())
        }
    }
}
