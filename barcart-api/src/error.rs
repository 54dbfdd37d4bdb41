use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use barcart_order::error::UnavailableItem;
use barcart_order::CheckoutError;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    /// Payment provider rejected the request; its message is surfaced as-is
    UpstreamError(String),
    PaymentNotCompleted { status: String },
    UnavailableItems(Vec<UnavailableItem>),
    AlreadyProcessed { message: String, order_ids: Vec<Uuid> },
    ServiceUnavailable(String),
    /// 500 with a client-safe message; `detail` only goes to the log
    OperationFailed { message: &'static str, detail: String },
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::UpstreamError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::PaymentNotCompleted { status } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Payment not completed", "status": status }),
            ),
            AppError::UnavailableItems(items) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "Some items are no longer available in the requested quantity",
                    "unavailableItems": items,
                }),
            ),
            AppError::AlreadyProcessed { message, order_ids } => (
                StatusCode::CONFLICT,
                json!({ "error": message, "existingOrderIds": order_ids }),
            ),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg }))
            }
            AppError::OperationFailed { message, detail } => {
                tracing::error!("{}: {}", message, detail);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart
            | CheckoutError::InvalidItem(_)
            | CheckoutError::InvalidPaymentIntent => AppError::ValidationError(err.to_string()),
            CheckoutError::InsufficientInventory(items) => AppError::UnavailableItems(items),
            CheckoutError::StoreLookup(detail) => AppError::OperationFailed {
                message: "Failed to fetch store information",
                detail,
            },
            CheckoutError::TaxCalculation(detail) => AppError::OperationFailed {
                message: "Failed to calculate taxes",
                detail,
            },
            CheckoutError::PaymentNotConfigured => AppError::ServiceUnavailable(err.to_string()),
            CheckoutError::PaymentProvider(msg) => AppError::UpstreamError(msg),
            CheckoutError::PaymentNotCompleted { status } => AppError::PaymentNotCompleted {
                status: status.as_str().to_string(),
            },
            CheckoutError::AlreadyMaterialized { ref order_ids, .. } => AppError::AlreadyProcessed {
                order_ids: order_ids.clone(),
                message: err.to_string(),
            },
            CheckoutError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
