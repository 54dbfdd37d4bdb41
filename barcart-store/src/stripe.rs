//! Stripe REST client for customers, payment intents and Connect transfers.

use async_trait::async_trait;
use barcart_core::payment::{
    is_payment_intent_id, CustomerRecord, IntentRequest, PaymentError, PaymentIntent,
    PaymentProvider, PaymentStatus, Transfer, TransferRequest,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::app_config::StripeSettings;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeErrorType {
    ApiError,
    AuthenticationError,
    CardError,
    IdempotencyError,
    InvalidRequestError,
    RateLimitError,
    Unknown,
}

impl From<&str> for StripeErrorType {
    fn from(s: &str) -> Self {
        match s {
            "api_error" => StripeErrorType::ApiError,
            "authentication_error" => StripeErrorType::AuthenticationError,
            "card_error" => StripeErrorType::CardError,
            "idempotency_error" => StripeErrorType::IdempotencyError,
            "invalid_request_error" => StripeErrorType::InvalidRequestError,
            "rate_limit_error" => StripeErrorType::RateLimitError,
            _ => StripeErrorType::Unknown,
        }
    }
}

// { "error": { "type", "code", "message", "param" } }
#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: String,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stripe error: {type_:?} status={status} message={message:?} code={code:?}")]
    Stripe {
        type_: StripeErrorType,
        message: Option<String>,
        code: Option<String>,
        status: u16,
    },
}

impl From<StripeApiError> for PaymentError {
    fn from(e: StripeApiError) -> Self {
        match e {
            StripeApiError::Http(msg) => PaymentError::Transport(msg),
            StripeApiError::Decode(msg) => PaymentError::Decode(msg),
            StripeApiError::Stripe { message, code, .. } => PaymentError::Provider {
                message: message.unwrap_or_else(|| "Payment provider error".to_string()),
                code,
            },
        }
    }
}

fn map_error(status: StatusCode, body: &str) -> StripeApiError {
    match serde_json::from_str::<StripeErrorEnvelope>(body) {
        Ok(env) => StripeApiError::Stripe {
            type_: StripeErrorType::from(env.error.type_.as_str()),
            message: env.error.message,
            code: env.error.code,
            status: status.as_u16(),
        },
        Err(_) => StripeApiError::Http(format!("status={} body={}", status.as_u16(), body)),
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    email: Option<String>,
}

impl From<StripeCustomer> for CustomerRecord {
    fn from(c: StripeCustomer) -> Self {
        Self { id: c.id, email: c.email }
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    amount: i64,
    currency: String,
    status: PaymentStatus,
    client_secret: Option<String>,
    customer: Option<String>,
    transfer_group: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    created: i64,
}

impl From<StripePaymentIntent> for PaymentIntent {
    fn from(pi: StripePaymentIntent) -> Self {
        Self {
            id: pi.id,
            amount_cents: pi.amount,
            currency: pi.currency,
            status: pi.status,
            client_secret: pi.client_secret,
            customer_id: pi.customer,
            transfer_group: pi.transfer_group,
            metadata: pi.metadata,
            created_at: DateTime::<Utc>::from_timestamp(pi.created, 0).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeTransfer {
    id: String,
    amount: i64,
    destination: String,
    transfer_group: Option<String>,
}

impl From<StripeTransfer> for Transfer {
    fn from(t: StripeTransfer) -> Self {
        Self {
            id: t.id,
            amount_cents: t.amount,
            destination_account: t.destination,
            transfer_group: t.transfer_group,
        }
    }
}

fn intent_form(request: &IntentRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("amount".into(), request.amount_cents.to_string()),
        ("currency".into(), request.currency.to_ascii_lowercase()),
        ("transfer_group".into(), request.transfer_group.clone()),
        ("automatic_payment_methods[enabled]".into(), "true".into()),
    ];
    if let Some(customer) = &request.customer_id {
        form.push(("customer".into(), customer.clone()));
    }
    if let Some(email) = &request.receipt_email {
        form.push(("receipt_email".into(), email.clone()));
    }
    if let Some(dest) = &request.destination {
        form.push(("transfer_data[destination]".into(), dest.account_id.clone()));
        form.push(("on_behalf_of".into(), dest.account_id.clone()));
        form.push(("application_fee_amount".into(), dest.application_fee_cents.to_string()));
    }
    for (k, v) in &request.metadata {
        form.push((format!("metadata[{}]", k), v.clone()));
    }
    form
}

fn intent_path(intent_id: &str) -> Result<String, PaymentError> {
    if !is_payment_intent_id(intent_id) {
        return Err(PaymentError::Provider {
            message: "Invalid payment intent id".to_string(),
            code: Some("resource_missing".to_string()),
        });
    }
    Ok(format!("/v1/payment_intents/{}", intent_id))
}

fn transfer_form(request: &TransferRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("amount".into(), request.amount_cents.to_string()),
        ("currency".into(), request.currency.to_ascii_lowercase()),
        ("destination".into(), request.destination_account.clone()),
    ];
    if let Some(group) = &request.transfer_group {
        form.push(("transfer_group".into(), group.clone()));
    }
    for (k, v) in &request.metadata {
        form.push((format!("metadata[{}]", k), v.clone()));
    }
    form
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_version: Option<String>,
    base_url: String,
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Result<Self, StripeApiError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| StripeApiError::Http(e.to_string()))?;
        Ok(Self {
            http,
            secret_key: settings.secret_key.clone(),
            api_version: settings.api_version.clone(),
            base_url: STRIPE_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn apply_common_headers(&self, req: RequestBuilder, idempotency_key: Option<&str>) -> RequestBuilder {
        let mut req = req.bearer_auth(&self.secret_key);
        if let Some(k) = idempotency_key {
            req = req.header("Idempotency-Key", k);
        }
        if let Some(v) = self.api_version.as_deref().filter(|v| !v.is_empty()) {
            req = req.header("Stripe-Version", v);
        }
        req
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        idempotency_key: Option<&str>,
    ) -> Result<T, StripeApiError> {
        let resp = self
            .apply_common_headers(req, idempotency_key)
            .send()
            .await
            .map_err(|e| StripeApiError::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| StripeApiError::Decode(e.to_string()))?;
        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| StripeApiError::Decode(e.to_string()))
        } else {
            let err = map_error(status, &text);
            warn!(target: "stripe", status = status.as_u16(), error = %err, "stripe request failed");
            Err(err)
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip_all, fields(method = "GET", path = "/v1/customers"))]
    async fn find_customers_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<CustomerRecord>, PaymentError> {
        let req = self
            .http
            .get(self.url("/v1/customers"))
            .query(&[("email", email), ("limit", "10")]);
        let list: StripeList<StripeCustomer> = self.send(req, None).await?;
        Ok(list.data.into_iter().map(CustomerRecord::from).collect())
    }

    #[instrument(skip_all, fields(method = "POST", path = "/v1/customers"))]
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<CustomerRecord, PaymentError> {
        let mut form = vec![("email", email.to_string())];
        if let Some(name) = name {
            form.push(("name", name.to_string()));
        }
        let req = self.http.post(self.url("/v1/customers")).form(&form);
        let customer: StripeCustomer = self.send(req, None).await?;
        Ok(customer.into())
    }

    #[instrument(skip_all, fields(method = "POST", path = "/v1/payment_intents", amount_cents = request.amount_cents))]
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        info!(
            target: "stripe",
            currency = %request.currency,
            transfer_group = %request.transfer_group,
            destination = request.destination.is_some(),
            "stripe request"
        );
        let req = self
            .http
            .post(self.url("/v1/payment_intents"))
            .form(&intent_form(request));
        let intent: StripePaymentIntent = self.send(req, request.idempotency_key.as_deref()).await?;
        Ok(intent.into())
    }

    #[instrument(skip(self), fields(method = "GET", path = "/v1/payment_intents/{id}"))]
    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let req = self.http.get(self.url(&intent_path(intent_id)?));
        let intent: StripePaymentIntent = self.send(req, None).await?;
        Ok(intent.into())
    }

    #[instrument(skip_all, fields(method = "POST", path = "/v1/transfers", amount_cents = request.amount_cents))]
    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer, PaymentError> {
        info!(
            target: "stripe",
            destination = %request.destination_account,
            idempotency_key = request.idempotency_key.as_deref().unwrap_or(""),
            "stripe request"
        );
        let req = self
            .http
            .post(self.url("/v1/transfers"))
            .form(&transfer_form(request));
        let transfer: StripeTransfer = self.send(req, request.idempotency_key.as_deref()).await?;
        Ok(transfer.into())
    }
}
