use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use barcart_api::{app, AppState, Collaborators};
use barcart_core::payment::{PaymentProvider, PaymentStatus};
use barcart_core::CartItem;
use barcart_order::metadata::{encode_breakdown, BreakdownEntry};
use barcart_core::pricing::TaxCalculator;
use barcart_order::mock::{
    cart_item, store_profile, FixedTaxCalculator, InMemoryMarketplace, MockPaymentProvider,
    UnavailableTaxCalculator,
};
use barcart_order::{FeeRule, FeeSchedule};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    market: Arc<InMemoryMarketplace>,
    provider: Arc<MockPaymentProvider>,
    app: Router,
}

fn harness(with_payments: bool) -> Harness {
    harness_with_tax(with_payments, Arc::new(FixedTaxCalculator::new(450, 9.0)))
}

fn harness_with_tax(with_payments: bool, tax: Arc<dyn TaxCalculator>) -> Harness {
    let market = Arc::new(InMemoryMarketplace::new());
    let provider = Arc::new(MockPaymentProvider::new());
    let payments: Option<Arc<dyn PaymentProvider>> = if with_payments {
        Some(provider.clone())
    } else {
        None
    };
    let collaborators = Collaborators {
        payments,
        stores: market.clone(),
        inventory: market.clone(),
        orders: market.clone(),
        deliveries: market.clone(),
        notifications: market.clone(),
        tax,
        fees: Arc::new(FeeSchedule::new(FeeRule { percent: 10.0, fixed_cents: 0 })),
    };
    let app = app(AppState::new(collaborators, "usd", 499));
    Harness { market, provider, app }
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn address() -> Value {
    json!({ "street": "1 Main St", "city": "Austin", "state": "tx", "zipCode": "78701" })
}

fn checkout_body(items: &[CartItem]) -> Value {
    json!({
        "items": items,
        "customerEmail": "buyer@example.com",
        "shippingAddress": address(),
    })
}

/// Two stores: 2 x $20 from the first, 1 x $10 from the second.
fn two_store_cart(h: &Harness) -> Vec<CartItem> {
    let s1 = h.market.add_store(store_profile("Corner Liquors", Some("acct_s1")));
    let s2 = h.market.add_store(store_profile("Bottle Shop", Some("acct_s2")));
    let a = cart_item(Some(s1), 20.0, 2);
    let b = cart_item(Some(s2), 10.0, 1);
    h.market.set_stock(a.id, 10);
    h.market.set_stock(b.id, 10);
    vec![a, b]
}

fn paid_intent(h: &Harness, items: &[CartItem], status: PaymentStatus) -> String {
    let entries: Vec<BreakdownEntry> = items
        .iter()
        .map(|i| BreakdownEntry {
            store_id: i.store_id,
            total_cents: i.line_subtotal_cents(),
            stripe_account_id: Some(format!("acct_{}", i.id.simple())),
        })
        .collect();
    let mut metadata = BTreeMap::new();
    encode_breakdown(&entries, &mut metadata).unwrap();
    h.provider.add_intent(entries.iter().map(|e| e.total_cents).sum(), status, metadata)
}

#[tokio::test]
async fn test_health() {
    let h = harness(true);
    let (status, body) = get_text(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_checkout_splits_cart_by_store() {
    let h = harness(true);
    let items = two_store_cart(&h);

    let (status, body) = post(&h.app, "/checkout", checkout_body(&items)).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["subtotal"], json!(50.0));
    assert_eq!(body["taxes"], json!(4.5));
    assert_eq!(body["shipping"], json!(9.98));
    assert_eq!(body["totalAmount"], json!(64.48));
    assert_eq!(body["storeBreakdown"][0]["tax"], json!(3.6));
    assert_eq!(body["storeBreakdown"][1]["tax"], json!(0.9));
    assert!(body["clientSecret"].is_string());
    assert!(body["transferGroup"].as_str().unwrap().starts_with("order_"));

    let request = h.provider.intent_requests().pop().unwrap();
    assert_eq!(request.amount_cents, 6448);
    assert!(request.destination.is_none());
}

#[tokio::test]
async fn test_checkout_rejects_empty_cart() {
    let h = harness(true);
    let (status, body) = post(&h.app, "/checkout", checkout_body(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No items in cart");
}

#[tokio::test]
async fn test_checkout_without_payment_provider() {
    let h = harness(false);
    let items = two_store_cart(&h);
    let (status, body) = post(&h.app, "/checkout", checkout_body(&items)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Payment processing is not configured");
}

#[tokio::test]
async fn test_checkout_reports_unavailable_items() {
    let h = harness(true);
    let items = two_store_cart(&h);
    h.market.set_stock(items[0].id, 1);

    let (status, body) = post(&h.app, "/checkout", checkout_body(&items)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    let unavailable = body["unavailableItems"].as_array().unwrap();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0]["available"], 1);
    assert_eq!(unavailable[0]["requested"], 2);
    assert!(h.provider.intent_requests().is_empty());
}

#[tokio::test]
async fn test_checkout_rejects_out_of_range_line() {
    let h = harness(true);
    let mut items = two_store_cart(&h);
    items[0].price = 1.0e15;
    items[0].quantity = 10_000;

    let (status, body) = post(&h.app, "/checkout", checkout_body(&items)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid price"));
    assert!(h.provider.intent_requests().is_empty());
}

#[tokio::test]
async fn test_checkout_surfaces_provider_rejection() {
    let h = harness(true);
    let items = two_store_cart(&h);
    h.provider.reject_intents("Your card was declined.");

    let (status, body) = post(&h.app, "/checkout", checkout_body(&items)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Your card was declined.");
}

#[tokio::test]
async fn test_checkout_tax_outage() {
    let h = harness_with_tax(true, Arc::new(UnavailableTaxCalculator));
    let items = two_store_cart(&h);

    let (status, body) = post(&h.app, "/checkout", checkout_body(&items)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to calculate taxes");
    assert!(h.provider.intent_requests().is_empty());
}

#[tokio::test]
async fn test_confirm_order_requires_succeeded_payment() {
    let h = harness(true);
    let items = two_store_cart(&h);
    let intent = paid_intent(&h, &items, PaymentStatus::RequiresPaymentMethod);

    let (status, body) = post(
        &h.app,
        "/confirm-order",
        json!({ "paymentIntentId": intent, "shippingAddress": address(), "items": items }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment not completed");
    assert_eq!(body["status"], "requires_payment_method");
    assert!(h.market.orders().is_empty());
}

#[tokio::test]
async fn test_confirm_order_rejects_malformed_intent_id() {
    let h = harness(true);
    let items = two_store_cart(&h);

    let (status, body) = post(
        &h.app,
        "/confirm-order",
        json!({ "paymentIntentId": "pi_1/../balance", "shippingAddress": address(), "items": items }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid payment intent id");
}

#[tokio::test]
async fn test_confirm_order_once_per_payment() {
    let h = harness(true);
    let items = two_store_cart(&h);
    let intent = paid_intent(&h, &items, PaymentStatus::Succeeded);
    let body = json!({
        "paymentIntentId": intent,
        "customerId": "not-a-uuid",
        "shippingAddress": address(),
        "items": items,
    });

    let (status, first) = post(&h.app, "/confirm-order", body.clone()).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["success"], true);
    assert_eq!(first["orders"].as_array().unwrap().len(), 2);
    assert_eq!(first["orders"][0]["total"], json!(40.0));
    assert_eq!(first["transfers"].as_array().unwrap().len(), 2);
    assert_eq!(first["failedStores"], json!([]));
    assert_eq!(first["stores"][0]["order"]["status"], "ok");
    assert_eq!(first["stores"][0]["delivery"]["status"], "skipped");

    let (status, second) = post(&h.app, "/confirm-order", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(second["existingOrderIds"].as_array().unwrap().len(), 2);
    assert_eq!(h.market.orders().len(), 2);
}

#[tokio::test]
async fn test_metrics_exposes_checkout_counter() {
    let h = harness(true);
    let items = two_store_cart(&h);
    let (status, _) = post(&h.app, "/checkout", checkout_body(&items)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, text) = get_text(&h.app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("barcart_checkouts_total"));
}
