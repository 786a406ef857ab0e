//! Coupon purchase orchestration with compensating transactions.
//!
//! A purchase moves credits from buyer to seller, hands the coupon to the
//! buyer and appends a ledger entry. The record store offers no multi-row
//! transaction, so the orchestrator runs these as sequential steps:
//! 1. Debit the buyer
//! 2. Load and credit the seller
//! 3. Mark the coupon sold (compare-and-set, the linearization point)
//! 4. Record the ledger entry (the commit point)
//!
//! If any step fails, previously completed steps are compensated in reverse
//! order. A compensation that itself fails is escalated to the
//! reconciliation queue.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod receipt;
pub mod reminders;
pub mod saga;
pub mod services;
pub mod state;
pub mod steps;

pub use config::PurchaseConfig;
pub use error::{FailureKind, NotificationError, PurchaseError, ReconciliationError};
pub use orchestrator::PurchaseOrchestrator;
pub use receipt::{NotificationWarning, PurchaseReceipt};
pub use reminders::{ExpiryReminderJob, ReminderReport};
pub use saga::{Baseline, Compensation, PurchaseSaga};
pub use services::{
    ExpiryNotice, InMemoryNotificationSink, InMemoryReconciliationQueue, Incident,
    LoggingNotificationSink, NotificationSink, PurchaseNotice, ReconciliationQueue, SaleNotice,
    mask_contact,
};
pub use state::PurchaseState;
pub use steps::PurchaseStep;
