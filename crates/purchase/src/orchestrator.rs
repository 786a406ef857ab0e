//! Purchase orchestrator for the coupon purchase saga.

use std::future::Future;

use common::{AccountId, CouponId, Credits, IncidentId};
use record_store::{Coupon, RecordStore, RecordStoreError};

use crate::config::PurchaseConfig;
use crate::error::{NotificationError, PurchaseError};
use crate::receipt::{NotificationWarning, PurchaseReceipt};
use crate::saga::{Compensation, PurchaseSaga};
use crate::services::notifications::{NotificationSink, PurchaseNotice, SaleNotice, mask_contact};
use crate::services::reconciliation::{Incident, ReconciliationQueue};
use crate::state::PurchaseState;
use crate::steps::{PurchaseStep, join_steps};

/// A store call that returned no result.
#[derive(Debug, Clone, Copy)]
struct StepFailure {
    step: PurchaseStep,
    /// The write may have been applied before the call failed.
    outcome_unknown: bool,
}

impl From<StepFailure> for PurchaseError {
    fn from(failure: StepFailure) -> Self {
        PurchaseError::StepFailed { step: failure.step }
    }
}

/// Orchestrates coupon purchases.
///
/// Runs the purchase as a sequence of conditional store writes
/// (debit buyer → credit seller → mark sold → record ledger) and compensates
/// completed writes in reverse order when a later one fails. Rollbacks that
/// cannot complete are escalated to the reconciliation queue.
pub struct PurchaseOrchestrator<S, N, Q>
where
    S: RecordStore,
    N: NotificationSink,
    Q: ReconciliationQueue,
{
    store: S,
    notifier: N,
    reconciliation: Q,
    config: PurchaseConfig,
}

impl<S, N, Q> PurchaseOrchestrator<S, N, Q>
where
    S: RecordStore,
    N: NotificationSink,
    Q: ReconciliationQueue,
{
    /// Creates a new orchestrator with the default configuration.
    pub fn new(store: S, notifier: N, reconciliation: Q) -> Self {
        Self::with_config(store, notifier, reconciliation, PurchaseConfig::default())
    }

    pub fn with_config(store: S, notifier: N, reconciliation: Q, config: PurchaseConfig) -> Self {
        Self {
            store,
            notifier,
            reconciliation,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn reconciliation(&self) -> &Q {
        &self.reconciliation
    }

    pub fn config(&self) -> &PurchaseConfig {
        &self.config
    }

    /// Buys `coupon_id` for `buyer_id`.
    ///
    /// On success the buyer owns the coupon, the price has moved from buyer
    /// to seller and exactly one ledger entry records the sale. On failure
    /// every completed write has been compensated, or the error is
    /// [`PurchaseError::RollbackFailed`] and an incident has been queued.
    /// A buyer debit or seller credit that timed out may have landed and
    /// cannot be undone blindly, so it always ends in a rollback failure.
    #[tracing::instrument(skip(self), fields(%coupon_id, %buyer_id))]
    pub async fn purchase(
        &self,
        coupon_id: CouponId,
        buyer_id: AccountId,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        metrics::counter!("purchase_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.execute(coupon_id, buyer_id).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("purchase_duration_seconds").record(duration);
        match &result {
            Ok(receipt) => {
                metrics::counter!("purchase_committed_total").increment(1);
                tracing::info!(
                    ledger_entry_id = %receipt.ledger_entry_id,
                    amount = %receipt.amount,
                    duration,
                    "purchase committed"
                );
            }
            // Counted and logged where the rollback failed.
            Err(err) if err.is_fatal() => {}
            Err(err) => {
                metrics::counter!("purchase_rejected_total", "reason" => err.kind().as_str())
                    .increment(1);
                tracing::info!(reason = %err.kind(), error = %err, "purchase rejected");
            }
        }
        result
    }

    async fn execute(
        &self,
        coupon_id: CouponId,
        buyer_id: AccountId,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        // 1. Read-only preconditions
        let coupon = self
            .call(PurchaseStep::LoadCoupon, self.store.get_coupon(coupon_id))
            .await?
            .ok_or(PurchaseError::NotFound(coupon_id))?;

        if coupon.is_sold() {
            return Err(PurchaseError::AlreadySold(coupon_id));
        }
        if coupon.seller_id == buyer_id {
            return Err(PurchaseError::SelfPurchase);
        }

        let buyer = self
            .call(PurchaseStep::LoadBuyer, self.store.get_account(buyer_id))
            .await?
            .ok_or(PurchaseError::BuyerNotFound(buyer_id))?;

        if !buyer.credits.covers(coupon.price) {
            return Err(PurchaseError::InsufficientFunds {
                required: coupon.price,
                available: buyer.credits,
            });
        }

        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        let price = saga.price();
        let seller_id = saga.seller_id();
        tracing::debug!(baseline = ?saga.baseline(), %price, "purchase started");

        // 2. Debit the buyer
        match self
            .call(
                PurchaseStep::DebitBuyer,
                self.store.debit_account(buyer_id, price),
            )
            .await
        {
            Ok(Some(_)) => saga.step_completed(PurchaseStep::DebitBuyer),
            Ok(None) => {
                // Nothing was written, so there is nothing to compensate.
                saga.step_failed(PurchaseStep::DebitBuyer);
                saga.finish_compensation();
                return Err(self.debit_rejected(buyer_id, price).await);
            }
            Err(failure) => {
                if failure.outcome_unknown {
                    saga.write_unresolved(PurchaseStep::DebitBuyer);
                }
                return Err(self
                    .roll_back(&mut saga, PurchaseStep::DebitBuyer, failure.into())
                    .await);
            }
        }

        // 3. Load and credit the seller
        match self
            .call(PurchaseStep::LoadSeller, self.store.get_account(seller_id))
            .await
        {
            Ok(Some(seller)) => {
                saga.record_seller_baseline(seller.credits);
                saga.step_completed(PurchaseStep::LoadSeller);
            }
            Ok(None) => {
                return Err(self
                    .roll_back(
                        &mut saga,
                        PurchaseStep::LoadSeller,
                        PurchaseError::SellerNotFound(seller_id),
                    )
                    .await);
            }
            Err(failure) => {
                return Err(self
                    .roll_back(&mut saga, PurchaseStep::LoadSeller, failure.into())
                    .await);
            }
        }

        match self
            .call(
                PurchaseStep::CreditSeller,
                self.store.credit_account(seller_id, price),
            )
            .await
        {
            Ok(Some(_)) => saga.step_completed(PurchaseStep::CreditSeller),
            Ok(None) => {
                let err = PurchaseError::StepFailed {
                    step: PurchaseStep::CreditSeller,
                };
                return Err(self
                    .roll_back(&mut saga, PurchaseStep::CreditSeller, err)
                    .await);
            }
            Err(failure) => {
                if failure.outcome_unknown {
                    saga.write_unresolved(PurchaseStep::CreditSeller);
                }
                return Err(self
                    .roll_back(&mut saga, PurchaseStep::CreditSeller, failure.into())
                    .await);
            }
        }

        // 4. Claim the coupon
        match self
            .call(
                PurchaseStep::MarkSold,
                self.store.mark_coupon_sold(coupon_id, buyer_id),
            )
            .await
        {
            Ok(true) => saga.step_completed(PurchaseStep::MarkSold),
            Ok(false) => {
                return Err(self
                    .roll_back(
                        &mut saga,
                        PurchaseStep::MarkSold,
                        PurchaseError::AlreadySold(coupon_id),
                    )
                    .await);
            }
            Err(failure) => {
                return Err(self
                    .roll_back(&mut saga, PurchaseStep::MarkSold, failure.into())
                    .await);
            }
        }

        // 5. Record the ledger entry; the sale is final once it exists
        let entry = match self
            .call(
                PurchaseStep::RecordLedger,
                self.store.insert_ledger_entry(saga.ledger_entry()),
            )
            .await
        {
            Ok(entry) => entry,
            Err(failure) => {
                return Err(self
                    .roll_back(&mut saga, PurchaseStep::RecordLedger, failure.into())
                    .await);
            }
        };
        saga.step_completed(PurchaseStep::RecordLedger);
        saga.commit();

        // 6. Best-effort notifications
        let notification_warning = self.notify(&coupon, buyer_id).await;

        Ok(PurchaseReceipt {
            coupon_id,
            ledger_entry_id: entry.id,
            code: coupon.code,
            amount: entry.amount,
            notification_warning,
        })
    }

    /// Runs one store call under the step timeout.
    ///
    /// Store errors are logged here and reduced to a step failure. A timeout
    /// leaves the call's outcome unknown.
    async fn call<T, F>(&self, step: PurchaseStep, operation: F) -> Result<T, StepFailure>
    where
        F: Future<Output = Result<T, RecordStoreError>>,
    {
        match tokio::time::timeout(self.config.step_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(%step, error = %err, "record store call failed");
                Err(StepFailure {
                    step,
                    outcome_unknown: err.is_indeterminate(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    %step,
                    timeout_ms = self.config.step_timeout.as_millis() as u64,
                    "record store call timed out"
                );
                Err(StepFailure {
                    step,
                    outcome_unknown: true,
                })
            }
        }
    }

    /// Explains a conditional debit that applied to no row.
    async fn debit_rejected(&self, buyer_id: AccountId, price: Credits) -> PurchaseError {
        match self
            .call(PurchaseStep::LoadBuyer, self.store.get_account(buyer_id))
            .await
        {
            Ok(Some(buyer)) => PurchaseError::InsufficientFunds {
                required: price,
                available: buyer.credits,
            },
            Ok(None) => PurchaseError::BuyerNotFound(buyer_id),
            Err(_) => PurchaseError::StepFailed {
                step: PurchaseStep::DebitBuyer,
            },
        }
    }

    /// Runs compensating writes in reverse order of completed steps.
    ///
    /// Returns `cause` if every compensation applied, otherwise a
    /// [`PurchaseError::RollbackFailed`] naming the incident.
    #[tracing::instrument(skip(self, saga, cause))]
    async fn roll_back(
        &self,
        saga: &mut PurchaseSaga,
        failed_step: PurchaseStep,
        cause: PurchaseError,
    ) -> PurchaseError {
        saga.step_failed(failed_step);
        tracing::warn!(
            %failed_step,
            reason = %cause.kind(),
            completed = %join_steps(saga.completed_steps()),
            "purchase step failed, compensating"
        );

        for compensation in saga.compensation_plan() {
            // The failed step's own undo runs on a write of unknown outcome;
            // finding nothing to undo is success.
            let uncertain = compensation.step() == failed_step;
            if !self.compensate(compensation, uncertain).await {
                saga.compensation_failed(compensation.step());
            }
        }
        saga.finish_compensation();

        if saga.state() == PurchaseState::RolledBack {
            metrics::counter!("purchase_rolled_back_total").increment(1);
            tracing::info!(%failed_step, "purchase rolled back");
            return cause;
        }

        metrics::counter!("purchase_rollback_failures_total").increment(1);
        tracing::error!(
            buyer_id = %saga.buyer_id(),
            seller_id = %saga.seller_id(),
            amount = %saga.price(),
            ledger_entry_id = %saga.ledger_entry_id(),
            %failed_step,
            failed_compensations = %join_steps(saga.failed_compensations()),
            baseline = ?saga.baseline(),
            "rollback failed, manual reconciliation required"
        );

        let incident_id = match Incident::from_saga(saga) {
            Some(incident) => self.escalate(incident).await,
            None => None,
        };

        PurchaseError::RollbackFailed {
            failed_step,
            failed_compensations: saga.failed_compensations().to_vec(),
            incident_id,
        }
    }

    /// Queues an incident, returning its id once it is queued.
    async fn escalate(&self, incident: Incident) -> Option<IncidentId> {
        let incident_id = incident.id;
        let enqueued =
            tokio::time::timeout(self.config.step_timeout, self.reconciliation.enqueue(incident))
                .await;
        match enqueued {
            Ok(Ok(())) => {
                tracing::info!(%incident_id, "incident queued for reconciliation");
                Some(incident_id)
            }
            Ok(Err(err)) => {
                tracing::error!(%incident_id, error = %err, "failed to enqueue incident");
                None
            }
            Err(_) => {
                tracing::error!(%incident_id, "timed out enqueueing incident");
                None
            }
        }
    }

    /// Applies one compensation, returning whether it took effect.
    async fn compensate(&self, compensation: Compensation, uncertain: bool) -> bool {
        let step = compensation.step();
        let outcome = match compensation {
            Compensation::DeleteLedgerEntry(id) => self
                .call(step, self.store.delete_ledger_entry(id))
                .await
                .map(|deleted| deleted || uncertain),
            Compensation::UnmarkSold {
                coupon_id,
                buyer_id,
            } => self
                .call(step, self.store.unmark_coupon_sold(coupon_id, buyer_id))
                .await
                .map(|applied| applied || uncertain),
            Compensation::ReclaimSellerCredit { seller_id, amount } => self
                .call(step, self.store.debit_account(seller_id, amount))
                .await
                .map(|balance| balance.is_some()),
            Compensation::RefundBuyer { buyer_id, amount } => self
                .call(step, self.store.credit_account(buyer_id, amount))
                .await
                .map(|balance| balance.is_some()),
        };

        match outcome {
            Ok(true) => {
                tracing::debug!(compensation = compensation.name(), "compensation applied");
                true
            }
            Ok(false) => {
                tracing::warn!(
                    compensation = compensation.name(),
                    "compensation matched no record"
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Sends the purchase and sale notifications concurrently.
    ///
    /// Returns a warning instead of an error: the sale is already final.
    async fn notify(&self, coupon: &Coupon, buyer_id: AccountId) -> Option<NotificationWarning> {
        let (buyer, seller) = tokio::join!(
            self.call(PurchaseStep::LoadBuyer, self.store.get_account(buyer_id)),
            self.call(
                PurchaseStep::LoadSeller,
                self.store.get_account(coupon.seller_id)
            ),
        );
        let (buyer, seller) = match (buyer, seller) {
            (Ok(Some(buyer)), Ok(Some(seller))) => (buyer, seller),
            _ => {
                metrics::counter!("purchase_notification_failures_total").increment(1);
                tracing::warn!("could not load contacts for notifications");
                return Some(NotificationWarning::new(
                    "Purchase completed but notification contacts could not be loaded",
                ));
            }
        };
        let (Some(buyer_contact), Some(seller_contact)) = (buyer.email, seller.email) else {
            tracing::debug!("contact missing, notifications skipped");
            return None;
        };

        let purchase_notice = PurchaseNotice {
            buyer_contact: buyer_contact.clone(),
            coupon_title: coupon.title.clone(),
            code: coupon.code.clone(),
            price: coupon.price,
            expiry_date: coupon.expiry_date,
        };
        let sale_notice = SaleNotice {
            seller_contact,
            coupon_title: coupon.title.clone(),
            price: coupon.price,
            buyer_contact: mask_contact(&buyer_contact),
        };

        let timeout = self.config.step_timeout;
        let (purchase_sent, sale_sent) = tokio::join!(
            tokio::time::timeout(timeout, self.notifier.notify_purchase(&purchase_notice)),
            tokio::time::timeout(timeout, self.notifier.notify_sale(&sale_notice)),
        );

        let failures: Vec<String> = [
            ("purchase confirmation", purchase_sent),
            ("sale notification", sale_sent),
        ]
        .into_iter()
        .filter_map(|(notice, sent)| {
            sent.unwrap_or(Err(NotificationError::Timeout))
                .err()
                .map(|err| format!("{notice}: {err}"))
        })
        .collect();

        if failures.is_empty() {
            return None;
        }
        metrics::counter!("purchase_notification_failures_total")
            .increment(failures.len() as u64);
        let message = format!(
            "Purchase completed but notifications failed: {}",
            failures.join("; ")
        );
        tracing::warn!(%message, "notification delivery failed");
        Some(NotificationWarning::new(message))
    }
}
