//! HTTP route handlers.

pub mod accounts;
pub mod coupons;
pub mod health;
pub mod incidents;
pub mod metrics;
pub mod notifications;

use std::str::FromStr;
use std::sync::Arc;

use purchase::{
    ExpiryReminderJob, InMemoryReconciliationQueue, NotificationSink, PurchaseOrchestrator,
};
use record_store::RecordStore;

use crate::error::ApiError;

/// Notification sink shared by the orchestrator and the reminder job.
pub type SharedNotifier = Arc<dyn NotificationSink>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore> {
    pub orchestrator: PurchaseOrchestrator<S, SharedNotifier, InMemoryReconciliationQueue>,
    pub reminders: ExpiryReminderJob<S, SharedNotifier>,
    pub cron_secret: Option<String>,
}

impl<S: RecordStore> AppState<S> {
    pub fn store(&self) -> &S {
        self.orchestrator.store()
    }
}

/// Parses a path or body identifier.
pub(crate) fn parse_id<T>(id: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
