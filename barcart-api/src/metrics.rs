use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use barcart_order::{CheckoutError, MaterializationReport, SideEffectOutcome};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref CHECKOUTS: IntCounterVec = IntCounterVec::new(
        Opts::new("barcart_checkouts_total", "Checkout attempts by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");
    static ref ORDERS_MATERIALIZED: IntCounter = IntCounter::new(
        "barcart_orders_materialized_total",
        "Orders created from confirmed payments"
    )
    .expect("metric can be created");
    static ref SIDE_EFFECT_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "barcart_side_effect_failures_total",
            "Best-effort order follow-up steps that failed"
        ),
        &["effect"]
    )
    .expect("metric can be created");
}

/// Registers the collectors with [`REGISTRY`]. Safe to call more than once.
pub fn register() {
    let _ = REGISTRY.register(Box::new(CHECKOUTS.clone()));
    let _ = REGISTRY.register(Box::new(ORDERS_MATERIALIZED.clone()));
    let _ = REGISTRY.register(Box::new(SIDE_EFFECT_FAILURES.clone()));
}

pub fn record_checkout(outcome: &str) {
    CHECKOUTS.with_label_values(&[outcome]).inc();
}

pub fn checkout_outcome(err: &CheckoutError) -> &'static str {
    match err {
        CheckoutError::EmptyCart | CheckoutError::InvalidItem(_) => "invalid",
        CheckoutError::InsufficientInventory(_) => "unavailable",
        CheckoutError::PaymentNotConfigured => "not_configured",
        CheckoutError::PaymentProvider(_) => "provider_error",
        _ => "error",
    }
}

pub fn record_materialization(report: &MaterializationReport) {
    ORDERS_MATERIALIZED.inc_by(report.orders.len() as u64);

    let failed = |effect: &str, outcome: &SideEffectOutcome| {
        if outcome.is_failed() {
            SIDE_EFFECT_FAILURES.with_label_values(&[effect]).inc();
        }
    };
    for store in &report.stores {
        failed("order", &store.order);
        failed("order_items", &store.order_items);
        failed("inventory", &store.inventory);
        failed("delivery", &store.delivery);
        failed("driver_assignment", &store.driver_assignment);
        failed("notification", &store.notification);
    }
    for transfer in &report.transfers {
        failed("transfer", &transfer.outcome);
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
