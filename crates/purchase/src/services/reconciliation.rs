//! Reconciliation queue for purchases whose rollback did not complete.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AccountId, CouponId, Credits, IncidentId, LedgerEntryId};
use serde::{Deserialize, Serialize};

use crate::error::ReconciliationError;
use crate::saga::{Baseline, PurchaseSaga};
use crate::steps::PurchaseStep;

/// A purchase left in an inconsistent state, awaiting manual repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub coupon_id: CouponId,
    pub buyer_id: AccountId,
    pub seller_id: AccountId,
    pub amount: Credits,
    pub ledger_entry_id: LedgerEntryId,
    /// The forward step whose failure triggered the rollback.
    pub failed_step: PurchaseStep,
    /// The steps whose compensation did not apply.
    pub failed_compensations: Vec<PurchaseStep>,
    pub baseline: Baseline,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Captures an incident from a saga that ended inconsistent.
    ///
    /// Returns `None` for a saga that never failed a step.
    pub fn from_saga(saga: &PurchaseSaga) -> Option<Self> {
        Some(Self {
            id: IncidentId::new(),
            coupon_id: saga.coupon_id(),
            buyer_id: saga.buyer_id(),
            seller_id: saga.seller_id(),
            amount: saga.price(),
            ledger_entry_id: saga.ledger_entry_id(),
            failed_step: saga.failed_step()?,
            failed_compensations: saga.failed_compensations().to_vec(),
            baseline: saga.baseline(),
            created_at: Utc::now(),
        })
    }
}

/// Durable hand-off of incidents to operators.
#[async_trait]
pub trait ReconciliationQueue: Send + Sync {
    /// Queues an incident for manual reconciliation.
    async fn enqueue(&self, incident: Incident) -> Result<(), ReconciliationError>;

    /// Lists queued incidents, oldest first.
    async fn incidents(&self) -> Result<Vec<Incident>, ReconciliationError>;
}

#[derive(Debug, Default)]
struct InMemoryReconciliationState {
    incidents: Vec<Incident>,
    fail_on_enqueue: bool,
}

/// In-memory reconciliation queue.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReconciliationQueue {
    state: Arc<Mutex<InMemoryReconciliationState>>,
}

impl InMemoryReconciliationQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryReconciliationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the queue to reject new incidents.
    pub fn set_fail_on_enqueue(&self, fail: bool) {
        self.state().fail_on_enqueue = fail;
    }

    /// Returns the number of queued incidents.
    pub fn incident_count(&self) -> usize {
        self.state().incidents.len()
    }
}

#[async_trait]
impl ReconciliationQueue for InMemoryReconciliationQueue {
    async fn enqueue(&self, incident: Incident) -> Result<(), ReconciliationError> {
        let mut state = self.state();
        if state.fail_on_enqueue {
            return Err(ReconciliationError::Unavailable(
                "queue rejected incident".to_string(),
            ));
        }
        state.incidents.push(incident);
        Ok(())
    }

    async fn incidents(&self) -> Result<Vec<Incident>, ReconciliationError> {
        Ok(self.state().incidents.clone())
    }
}
