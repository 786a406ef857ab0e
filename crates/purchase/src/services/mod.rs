//! Collaborator traits and in-memory implementations used by the orchestrator.

pub mod notifications;
pub mod reconciliation;

pub use notifications::{
    ExpiryNotice, InMemoryNotificationSink, LoggingNotificationSink, NotificationSink,
    PurchaseNotice, SaleNotice, mask_contact,
};
pub use reconciliation::{InMemoryReconciliationQueue, Incident, ReconciliationQueue};
