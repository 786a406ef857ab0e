//! Purchase error types.

use common::{AccountId, CouponId, Credits, IncidentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::steps::{PurchaseStep, join_steps};

/// Why a purchase did not complete.
///
/// Messages carry ids, amounts and step names only; store errors are logged
/// where they happen and never surface through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// The coupon does not exist.
    #[error("Coupon not found: {0}")]
    NotFound(CouponId),

    /// The coupon was sold before this purchase could claim it.
    #[error("Coupon already sold: {0}")]
    AlreadySold(CouponId),

    /// The buyer is the coupon's seller.
    #[error("You cannot buy your own coupon")]
    SelfPurchase,

    /// The buyer account does not exist.
    #[error("Buyer account not found: {0}")]
    BuyerNotFound(AccountId),

    /// The seller account disappeared before it could be credited.
    #[error("Seller account not found: {0}. Transaction cancelled.")]
    SellerNotFound(AccountId),

    /// The buyer's balance does not cover the price.
    #[error("Insufficient credits. You need {required} but have {available}.")]
    InsufficientFunds {
        required: Credits,
        available: Credits,
    },

    /// A record store call failed or timed out.
    #[error("Transaction failed ({step})")]
    StepFailed { step: PurchaseStep },

    /// A compensating write failed; persisted state is inconsistent.
    #[error(
        "Rollback after {failed_step} failed ({}); manual reconciliation required",
        join_steps(.failed_compensations)
    )]
    RollbackFailed {
        failed_step: PurchaseStep,
        failed_compensations: Vec<PurchaseStep>,
        incident_id: Option<IncidentId>,
    },
}

impl PurchaseError {
    /// Returns the failure category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            PurchaseError::NotFound(_) => FailureKind::NotFound,
            PurchaseError::AlreadySold(_) => FailureKind::AlreadySold,
            PurchaseError::SelfPurchase => FailureKind::SelfPurchase,
            PurchaseError::BuyerNotFound(_) => FailureKind::BuyerNotFound,
            PurchaseError::SellerNotFound(_) => FailureKind::SellerNotFound,
            PurchaseError::InsufficientFunds { .. } => FailureKind::InsufficientFunds,
            PurchaseError::StepFailed { .. } => FailureKind::StepFailure,
            PurchaseError::RollbackFailed { .. } => FailureKind::RollbackFailure,
        }
    }

    /// Returns the step that failed, for store failures.
    pub fn step(&self) -> Option<PurchaseStep> {
        match self {
            PurchaseError::StepFailed { step } => Some(*step),
            PurchaseError::RollbackFailed { failed_step, .. } => Some(*failed_step),
            _ => None,
        }
    }

    /// Returns true if persisted state may be inconsistent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PurchaseError::RollbackFailed { .. })
    }
}

/// Failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NotFound,
    AlreadySold,
    SelfPurchase,
    BuyerNotFound,
    SellerNotFound,
    InsufficientFunds,
    StepFailure,
    RollbackFailure,
    /// Soft failure attached to a successful receipt.
    NotificationFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "NOT_FOUND",
            FailureKind::AlreadySold => "ALREADY_SOLD",
            FailureKind::SelfPurchase => "SELF_PURCHASE",
            FailureKind::BuyerNotFound => "BUYER_NOT_FOUND",
            FailureKind::SellerNotFound => "SELLER_NOT_FOUND",
            FailureKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            FailureKind::StepFailure => "STEP_FAILURE",
            FailureKind::RollbackFailure => "ROLLBACK_FAILURE",
            FailureKind::NotificationFailure => "NOTIFICATION_FAILURE",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by a notification sink.
#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    /// The message could not be delivered.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// The sink did not answer in time.
    #[error("Notification timed out")]
    Timeout,
}

/// Errors raised by a reconciliation queue.
#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("Reconciliation queue unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_reports_required_and_available() {
        let err = PurchaseError::InsufficientFunds {
            required: Credits::new(10).unwrap(),
            available: Credits::new(5).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits. You need 10 but have 5."
        );
        assert_eq!(err.kind(), FailureKind::InsufficientFunds);
    }

    #[test]
    fn step_failure_names_the_step() {
        let err = PurchaseError::StepFailed {
            step: PurchaseStep::CreditSeller,
        };
        assert_eq!(err.to_string(), "Transaction failed (credit_seller)");
        assert_eq!(err.step(), Some(PurchaseStep::CreditSeller));
        assert!(!err.is_fatal());
    }

    #[test]
    fn rollback_failure_is_fatal() {
        let err = PurchaseError::RollbackFailed {
            failed_step: PurchaseStep::RecordLedger,
            failed_compensations: vec![PurchaseStep::MarkSold, PurchaseStep::DebitBuyer],
            incident_id: None,
        };
        assert!(err.is_fatal());
        assert_eq!(err.kind(), FailureKind::RollbackFailure);
        assert!(err.to_string().contains("mark_sold, debit_buyer"));
    }

    #[test]
    fn kinds_serialize_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureKind::AlreadySold).unwrap(),
            "\"ALREADY_SOLD\""
        );
        for kind in [
            FailureKind::NotFound,
            FailureKind::SelfPurchase,
            FailureKind::RollbackFailure,
            FailureKind::NotificationFailure,
        ] {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }
}
