//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use purchase::{FailureKind, PurchaseError};
use record_store::RecordStoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or wrong bearer token.
    #[error("Unauthorized")]
    Unauthorized,
    /// Purchase rejected or failed.
    #[error(transparent)]
    Purchase(#[from] PurchaseError),
    /// Record store error outside a purchase.
    #[error(transparent)]
    Store(#[from] RecordStoreError),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "Unauthorized" }),
            ),
            ApiError::Purchase(err) => {
                let kind = err.kind();
                (
                    purchase_status(kind),
                    serde_json::json!({ "error": err.to_string(), "reason": kind }),
                )
            }
            ApiError::Store(err) => store_error_body(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": msg }),
                )
            }
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Maps a purchase failure category to its HTTP status.
pub fn purchase_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::NotFound | FailureKind::BuyerNotFound => StatusCode::NOT_FOUND,
        FailureKind::AlreadySold => StatusCode::CONFLICT,
        FailureKind::SelfPurchase => StatusCode::BAD_REQUEST,
        FailureKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        FailureKind::SellerNotFound => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::StepFailure => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::RollbackFailure => StatusCode::INTERNAL_SERVER_ERROR,
        // Never returned as an error; attached to successful receipts.
        FailureKind::NotificationFailure => StatusCode::OK,
    }
}

fn store_error_body(err: RecordStoreError) -> (StatusCode, serde_json::Value) {
    match &err {
        RecordStoreError::Constraint(msg) => {
            (StatusCode::CONFLICT, serde_json::json!({ "error": msg }))
        }
        RecordStoreError::Unavailable { .. } => {
            tracing::warn!(error = %err, "record store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": "Service temporarily unavailable" }),
            )
        }
        _ => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Internal server error" }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purchase::PurchaseStep;

    #[test]
    fn test_purchase_statuses() {
        assert_eq!(purchase_status(FailureKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(purchase_status(FailureKind::AlreadySold), StatusCode::CONFLICT);
        assert_eq!(
            purchase_status(FailureKind::InsufficientFunds),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            purchase_status(FailureKind::StepFailure),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            purchase_status(FailureKind::RollbackFailure),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_purchase_error_response() {
        let response = ApiError::from(PurchaseError::StepFailed {
            step: PurchaseStep::MarkSold,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_constraint_is_conflict() {
        let response =
            ApiError::from(RecordStoreError::Constraint("duplicate".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
