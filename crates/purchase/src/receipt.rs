//! Result of a committed purchase.

use common::{CouponId, Credits, LedgerEntryId};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// A committed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub coupon_id: CouponId,
    pub ledger_entry_id: LedgerEntryId,
    /// The redeemable coupon code, now owned by the buyer.
    pub code: String,
    pub amount: Credits,
    /// Set when post-commit notifications failed. The sale stands regardless.
    pub notification_warning: Option<NotificationWarning>,
}

impl PurchaseReceipt {
    pub fn has_warning(&self) -> bool {
        self.notification_warning.is_some()
    }
}

/// A soft failure of the post-commit notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationWarning {
    pub kind: FailureKind,
    pub message: String,
}

impl NotificationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NotificationFailure,
            message: message.into(),
        }
    }
}
