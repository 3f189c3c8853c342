//! Maps storefront errors onto HTTP responses.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::{json, Value};

use crate::cart_store::PersistenceError;
use crate::checkout::CheckoutError;
use crate::domain::aggregates::CartError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            Self::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", self.to_string(), Some(json!({ "resource": what }))),
            Self::Cart(e @ CartError::StockLimitExceeded { product_id, max, .. }) => (
                StatusCode::CONFLICT, "stock_limit_exceeded", e.to_string(),
                Some(json!({ "product_id": product_id, "max": max })),
            ),
            Self::Cart(e @ CartError::InvalidQuantity) => (StatusCode::BAD_REQUEST, "invalid_quantity", e.to_string(), None),
            Self::Cart(e @ CartError::TotalOverflow) => (StatusCode::BAD_REQUEST, "cart_limit_exceeded", e.to_string(), None),
            Self::Cart(CartError::Persistence(PersistenceError::InvalidKey(key))) => (
                StatusCode::BAD_REQUEST, "invalid_session", format!("invalid cart session `{key}`"), None,
            ),
            Self::Cart(CartError::Persistence(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "cart_unavailable", "Cart storage is unavailable.".into(), None),
            Self::Checkout(e) => {
                let message = e.user_message();
                match e {
                    CheckoutError::EmptyCart => (StatusCode::BAD_REQUEST, "empty_cart", message, None),
                    CheckoutError::InvalidDelivery(errors) => (
                        StatusCode::UNPROCESSABLE_ENTITY, "invalid_delivery", message,
                        serde_json::to_value(errors.field_errors()).ok(),
                    ),
                    CheckoutError::ProductNotFound { product_id, .. } => (
                        StatusCode::CONFLICT, "product_not_found", message, Some(json!({ "product_id": product_id })),
                    ),
                    CheckoutError::InsufficientStock { product_id, available, .. } => (
                        StatusCode::CONFLICT, "insufficient_stock", message,
                        Some(json!({ "product_id": product_id, "available": available })),
                    ),
                    CheckoutError::CommitConflict(_) => (StatusCode::CONFLICT, "order_conflict", message, None),
                    CheckoutError::StockVerification(_) | CheckoutError::CommitFailed(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "order_failed", message, None)
                    }
                    CheckoutError::CommitTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "order_timeout", message, None),
                }
            }
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", "The store is unavailable.".into(), None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let mut body = json!({ "error": code, "message": message });
        if let (Some(details), Some(map)) = (details, body.as_object_mut()) {
            map.insert("details".into(), details);
        }
        (status, Json(body)).into_response()
    }
}
