use std::sync::OnceLock;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::auth::AuthError;
use crate::domain::cart::CartError;
use crate::domain::inventory::InventoryError;
use crate::domain::order::{CommandError, OrderError};
use crate::payments::PaymentError;
use crate::store::StoreError;

// ============================================================================
// Application Errors
// ============================================================================
//
// Domain errors are typed where they are detected and converted here into
// the error taxonomy the HTTP surface exposes. Every failure is rendered as
// `{success: false, message, errors?}`; the error kind is added only when
// diagnostics are enabled (development).
//
// ============================================================================

static DIAGNOSTICS: OnceLock<bool> = OnceLock::new();

/// Include the error kind in failure bodies. Set once at startup.
pub fn enable_diagnostics(enabled: bool) {
    let _ = DIAGNOSTICS.set(enabled);
}

fn diagnostics_enabled() -> bool {
    DIAGNOSTICS.get().copied().unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("{0}")]
    InvalidOrder(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Delivery of orders with multiple sellers must be confirmed by an admin")]
    UnsupportedMultiSellerDelivery,

    #[error("Payment setup failed: {0}")]
    PaymentSetupFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into(), errors: Vec::new() }
    }

    pub fn invalid_fields(errors: Vec<String>) -> Self {
        AppError::Validation { message: "Validation failed".to_string(), errors }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "ValidationError",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Conflict(_) => "Conflict",
            AppError::InsufficientStock(_) => "InsufficientStock",
            AppError::InvalidOrder(_) => "InvalidOrder",
            AppError::InvalidTransition(_) => "InvalidTransition",
            AppError::UnsupportedMultiSellerDelivery => "UnsupportedMultiSellerDelivery",
            AppError::PaymentSetupFailed(_) => "PaymentSetupFailed",
            AppError::Internal(_) => "Internal",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation { .. }
            | AppError::InsufficientStock(_)
            | AppError::InvalidOrder(_)
            | AppError::InvalidTransition(_)
            | AppError::UnsupportedMultiSellerDelivery
            | AppError::PaymentSetupFailed(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }

        let errors = match self {
            AppError::Validation { errors, .. } if !errors.is_empty() => Some(errors.as_slice()),
            _ => None,
        };

        // Internal details never reach the client
        let message = match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(status).json(ErrorBody {
            success: false,
            message,
            errors,
            error: diagnostics_enabled().then(|| self.kind()),
        })
    }
}

// ============================================================================
// Conversions from domain errors
// ============================================================================

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { .. } => AppError::InvalidTransition(err.to_string()),
            OrderError::UnsupportedMultiSellerDelivery => AppError::UnsupportedMultiSellerDelivery,
            OrderError::NotAuthorized(reason) => {
                AppError::Forbidden(format!("Not authorized: {reason}"))
            }
            OrderError::EmptyItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::DuplicateProduct(_) => AppError::InvalidOrder(err.to_string()),
            OrderError::AlreadyPlaced | OrderError::NotInitialized => AppError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => {
                AppError::Conflict("Order was modified concurrently, please retry".to_string())
            }
            StoreError::Duplicate(_) => AppError::Conflict(err.to_string()),
            StoreError::Serialization(_) | StoreError::Database(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Rejected(e) => e.into(),
            CommandError::Store(e) => e.into(),
            CommandError::Stock(e) => AppError::Internal(format!("stock release failed: {e}")),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductNotFound(_) => AppError::NotFound(err.to_string()),
            InventoryError::InsufficientStock { .. } => AppError::InsufficientStock(err.to_string()),
            InventoryError::InvalidQuantity(_) => AppError::validation(err.to_string()),
            InventoryError::Backend(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::CartNotFound | CartError::ProductNotFound(_) | CartError::ItemNotInCart(_) => {
                AppError::NotFound(err.to_string())
            }
            CartError::QuantityExceedsStock { .. } => AppError::InsufficientStock(err.to_string()),
            CartError::ZeroQuantity => AppError::validation(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unavailable(_) | PaymentError::Rejected(_) => {
                AppError::PaymentSetupFailed(err.to_string())
            }
            PaymentError::MissingSignature
            | PaymentError::MalformedSignature
            | PaymentError::SignatureMismatch
            | PaymentError::StaleSignature { .. }
            | PaymentError::MalformedPayload(_) => AppError::validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use actix_web::body::to_bytes;
    use uuid::Uuid;

    #[test]
    fn test_domain_errors_map_to_taxonomy() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (OrderError::NotAuthorized("nope").into(), StatusCode::FORBIDDEN),
            (OrderError::UnsupportedMultiSellerDelivery.into(), StatusCode::BAD_REQUEST),
            (
                StoreError::Conflict { order_id: Uuid::new_v4(), expected: 3 }.into(),
                StatusCode::CONFLICT,
            ),
            (CartError::CartNotFound.into(), StatusCode::NOT_FOUND),
            (AuthError::Expired.into(), StatusCode::UNAUTHORIZED),
            (
                PaymentError::Unavailable("down".to_string()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                InventoryError::InsufficientStock { product_id: Uuid::new_v4(), available: 1, requested: 2 }.into(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err.kind());
        }
    }

    #[test]
    fn test_invalid_transition_keeps_message() {
        let err: AppError = OrderError::InvalidTransition {
            current: OrderStatus::Delivered,
            target: OrderStatus::Cancelled,
            allowed: vec![],
        }
        .into();

        assert_eq!(err.kind(), "InvalidTransition");
        assert!(err.to_string().starts_with("Cannot change order status from delivered to cancelled"));
    }

    #[actix_web::test]
    async fn test_internal_message_is_not_leaked() {
        let response = AppError::Internal("connection reset by peer".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Internal server error");
    }

    #[actix_web::test]
    async fn test_validation_lists_field_errors() {
        let response = AppError::invalid_fields(vec!["street is required".to_string()]).error_response();

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Validation failed");
        assert_eq!(json["errors"][0], "street is required");
    }
}
