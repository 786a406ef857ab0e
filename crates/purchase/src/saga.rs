//! Purchase saga instance.

use common::{AccountId, CouponId, Credits, LedgerEntryId};
use record_store::{Account, Coupon, NewLedgerEntry};
use serde::{Deserialize, Serialize};

use crate::state::PurchaseState;
use crate::steps::PurchaseStep;

/// Values observed before the purchase wrote anything.
///
/// Compensations are applied as deltas rather than by writing these values
/// back, so a concurrent purchase touching the same account is not clobbered.
/// The baseline is kept for logs and reconciliation incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub buyer_credits: Credits,
    /// Captured when the seller is loaded, after the buyer debit.
    pub seller_credits: Option<Credits>,
    pub coupon_buyer: Option<AccountId>,
}

/// A compensating write undoing one completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Remove a ledger entry whose insert failed or timed out.
    DeleteLedgerEntry(LedgerEntryId),
    /// Return the coupon to the unsold state.
    UnmarkSold { coupon_id: CouponId, buyer_id: AccountId },
    /// Take the credited price back from the seller.
    ReclaimSellerCredit { seller_id: AccountId, amount: Credits },
    /// Give the debited price back to the buyer.
    RefundBuyer { buyer_id: AccountId, amount: Credits },
}

impl Compensation {
    /// Returns the step this compensation undoes.
    pub fn step(&self) -> PurchaseStep {
        match self {
            Compensation::DeleteLedgerEntry(_) => PurchaseStep::RecordLedger,
            Compensation::UnmarkSold { .. } => PurchaseStep::MarkSold,
            Compensation::ReclaimSellerCredit { .. } => PurchaseStep::CreditSeller,
            Compensation::RefundBuyer { .. } => PurchaseStep::DebitBuyer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compensation::DeleteLedgerEntry(_) => "delete_ledger_entry",
            Compensation::UnmarkSold { .. } => "unmark_sold",
            Compensation::ReclaimSellerCredit { .. } => "reclaim_seller_credit",
            Compensation::RefundBuyer { .. } => "refund_buyer",
        }
    }
}

/// One purchase execution.
///
/// Tracks the completed steps and the baseline, and derives the reverse-order
/// compensation plan when a step fails.
#[derive(Debug, Clone)]
pub struct PurchaseSaga {
    coupon_id: CouponId,
    buyer_id: AccountId,
    seller_id: AccountId,
    price: Credits,
    /// Chosen up front so an insert of unknown outcome can be deleted.
    ledger_entry_id: LedgerEntryId,
    baseline: Baseline,
    state: PurchaseState,
    completed_steps: Vec<PurchaseStep>,
    failed_step: Option<PurchaseStep>,
    failed_compensations: Vec<PurchaseStep>,
}

impl PurchaseSaga {
    /// Creates a saga from the validated coupon and buyer.
    pub fn new(coupon: &Coupon, buyer: &Account) -> Self {
        Self {
            coupon_id: coupon.id,
            buyer_id: buyer.id,
            seller_id: coupon.seller_id,
            price: coupon.price,
            ledger_entry_id: LedgerEntryId::new(),
            baseline: Baseline {
                buyer_credits: buyer.credits,
                seller_credits: None,
                coupon_buyer: coupon.buyer_id,
            },
            state: PurchaseState::NotStarted,
            completed_steps: Vec::new(),
            failed_step: None,
            failed_compensations: Vec::new(),
        }
    }

    /// Enters the mutation phase.
    pub fn start(&mut self) {
        debug_assert!(self.state.can_run(), "purchase already started");
        self.state = PurchaseState::Running;
    }

    /// Records the seller's balance as loaded before crediting.
    pub fn record_seller_baseline(&mut self, credits: Credits) {
        self.baseline.seller_credits = Some(credits);
    }

    pub fn step_completed(&mut self, step: PurchaseStep) {
        debug_assert_eq!(self.state, PurchaseState::Running);
        self.completed_steps.push(step);
    }

    /// Records a failed step and switches to compensation.
    pub fn step_failed(&mut self, step: PurchaseStep) {
        debug_assert!(self.state.can_compensate(), "purchase is not running");
        self.failed_step = Some(step);
        self.state = PurchaseState::Compensating;
    }

    pub fn compensation_failed(&mut self, step: PurchaseStep) {
        self.failed_compensations.push(step);
    }

    /// Records a balance write of unknown outcome.
    ///
    /// Neither the debit nor the credit can be undone conditionally, so the
    /// write is left unresolved and the purchase ends inconsistent.
    pub fn write_unresolved(&mut self, step: PurchaseStep) {
        debug_assert!(
            matches!(step, PurchaseStep::DebitBuyer | PurchaseStep::CreditSeller),
            "{step} has a conditional undo"
        );
        self.failed_compensations.push(step);
    }

    /// Ends compensation: rolled back if every compensation applied.
    pub fn finish_compensation(&mut self) {
        debug_assert_eq!(self.state, PurchaseState::Compensating);
        self.state = if self.failed_compensations.is_empty() {
            PurchaseState::RolledBack
        } else {
            PurchaseState::Inconsistent
        };
    }

    /// Marks the sale final once the ledger entry exists.
    pub fn commit(&mut self) {
        debug_assert_eq!(self.state, PurchaseState::Running);
        self.state = PurchaseState::Committed;
    }

    /// Returns the compensations to run, in order.
    ///
    /// Completed steps are undone in reverse. When the ledger insert or the
    /// coupon compare-and-set failed, that write is undone first in case it
    /// landed anyway; both undos are no-ops if it did not.
    pub fn compensation_plan(&self) -> Vec<Compensation> {
        let mut plan = Vec::new();
        match self.failed_step {
            Some(PurchaseStep::RecordLedger) => {
                plan.push(Compensation::DeleteLedgerEntry(self.ledger_entry_id));
            }
            Some(PurchaseStep::MarkSold) => plan.push(Compensation::UnmarkSold {
                coupon_id: self.coupon_id,
                buyer_id: self.buyer_id,
            }),
            _ => {}
        }
        for step in self.completed_steps.iter().rev() {
            match step {
                PurchaseStep::RecordLedger => {
                    plan.push(Compensation::DeleteLedgerEntry(self.ledger_entry_id));
                }
                PurchaseStep::MarkSold => plan.push(Compensation::UnmarkSold {
                    coupon_id: self.coupon_id,
                    buyer_id: self.buyer_id,
                }),
                PurchaseStep::CreditSeller => plan.push(Compensation::ReclaimSellerCredit {
                    seller_id: self.seller_id,
                    amount: self.price,
                }),
                PurchaseStep::DebitBuyer => plan.push(Compensation::RefundBuyer {
                    buyer_id: self.buyer_id,
                    amount: self.price,
                }),
                PurchaseStep::LoadCoupon | PurchaseStep::LoadBuyer | PurchaseStep::LoadSeller => {}
            }
        }
        plan
    }

    /// Builds the ledger entry this purchase commits with.
    pub fn ledger_entry(&self) -> NewLedgerEntry {
        NewLedgerEntry {
            id: self.ledger_entry_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            amount: self.price,
            coupon_id: self.coupon_id,
        }
    }
}

// Query methods
impl PurchaseSaga {
    pub fn state(&self) -> PurchaseState {
        self.state
    }

    pub fn coupon_id(&self) -> CouponId {
        self.coupon_id
    }

    pub fn buyer_id(&self) -> AccountId {
        self.buyer_id
    }

    pub fn seller_id(&self) -> AccountId {
        self.seller_id
    }

    pub fn price(&self) -> Credits {
        self.price
    }

    pub fn ledger_entry_id(&self) -> LedgerEntryId {
        self.ledger_entry_id
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// Returns the list of completed steps, in execution order.
    pub fn completed_steps(&self) -> &[PurchaseStep] {
        &self.completed_steps
    }

    pub fn failed_step(&self) -> Option<PurchaseStep> {
        self.failed_step
    }

    /// Returns the steps whose compensation failed.
    pub fn failed_compensations(&self) -> &[PurchaseStep] {
        &self.failed_compensations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixtures() -> (Coupon, Account) {
        let seller = AccountId::new();
        let coupon = Coupon {
            id: CouponId::new(),
            seller_id: seller,
            buyer_id: None,
            title: "Concert".to_string(),
            description: None,
            code: "GIG-1".to_string(),
            price: Credits::new(20).unwrap(),
            category: None,
            expiry_date: None,
            image_url: None,
            created_at: Utc::now(),
        };
        let buyer = Account {
            id: AccountId::new(),
            email: None,
            credits: Credits::new(50).unwrap(),
            created_at: Utc::now(),
        };
        (coupon, buyer)
    }

    #[test]
    fn new_saga_captures_baseline() {
        let (coupon, buyer) = fixtures();
        let saga = PurchaseSaga::new(&coupon, &buyer);

        assert_eq!(saga.state(), PurchaseState::NotStarted);
        assert_eq!(saga.baseline().buyer_credits, buyer.credits);
        assert_eq!(saga.baseline().seller_credits, None);
        assert_eq!(saga.baseline().coupon_buyer, None);
        assert!(saga.completed_steps().is_empty());
    }

    #[test]
    fn happy_path_commits() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.step_completed(PurchaseStep::DebitBuyer);
        saga.record_seller_baseline(Credits::new(5).unwrap());
        saga.step_completed(PurchaseStep::CreditSeller);
        saga.step_completed(PurchaseStep::MarkSold);
        saga.step_completed(PurchaseStep::RecordLedger);
        saga.commit();

        assert_eq!(saga.state(), PurchaseState::Committed);
        assert!(saga.state().is_terminal());
        assert_eq!(saga.baseline().seller_credits, Some(Credits::new(5).unwrap()));
    }

    #[test]
    fn plan_reverses_completed_steps() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.step_completed(PurchaseStep::DebitBuyer);
        saga.step_completed(PurchaseStep::CreditSeller);
        saga.step_completed(PurchaseStep::MarkSold);
        saga.step_failed(PurchaseStep::RecordLedger);

        let steps: Vec<_> = saga.compensation_plan().iter().map(|c| c.step()).collect();
        assert_eq!(
            steps,
            vec![
                PurchaseStep::RecordLedger,
                PurchaseStep::MarkSold,
                PurchaseStep::CreditSeller,
                PurchaseStep::DebitBuyer,
            ]
        );
        assert_eq!(
            saga.compensation_plan()[0],
            Compensation::DeleteLedgerEntry(saga.ledger_entry_id())
        );
    }

    #[test]
    fn failed_mark_sold_is_undone_before_credits() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.step_completed(PurchaseStep::DebitBuyer);
        saga.step_completed(PurchaseStep::LoadSeller);
        saga.step_completed(PurchaseStep::CreditSeller);
        saga.step_failed(PurchaseStep::MarkSold);

        let plan = saga.compensation_plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan[0],
            Compensation::UnmarkSold {
                coupon_id: coupon.id,
                buyer_id: buyer.id,
            }
        );
        assert_eq!(plan[1].name(), "reclaim_seller_credit");
        assert_eq!(plan[2].name(), "refund_buyer");
    }

    #[test]
    fn seller_lookup_failure_only_refunds_buyer() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.step_completed(PurchaseStep::DebitBuyer);
        saga.step_failed(PurchaseStep::LoadSeller);

        assert_eq!(
            saga.compensation_plan(),
            vec![Compensation::RefundBuyer {
                buyer_id: buyer.id,
                amount: coupon.price,
            }]
        );
    }

    #[test]
    fn failure_before_any_write_has_empty_plan() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.step_failed(PurchaseStep::DebitBuyer);

        assert!(saga.compensation_plan().is_empty());
        saga.finish_compensation();
        assert_eq!(saga.state(), PurchaseState::RolledBack);
    }

    #[test]
    fn failed_compensation_leaves_saga_inconsistent() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.step_completed(PurchaseStep::DebitBuyer);
        saga.step_failed(PurchaseStep::CreditSeller);
        assert_eq!(saga.state(), PurchaseState::Compensating);

        saga.compensation_failed(PurchaseStep::DebitBuyer);
        saga.finish_compensation();

        assert_eq!(saga.state(), PurchaseState::Inconsistent);
        assert_eq!(saga.failed_compensations(), &[PurchaseStep::DebitBuyer]);
        assert_eq!(saga.failed_step(), Some(PurchaseStep::CreditSeller));
    }

    #[test]
    fn unresolved_debit_leaves_saga_inconsistent() {
        let (coupon, buyer) = fixtures();
        let mut saga = PurchaseSaga::new(&coupon, &buyer);
        saga.start();
        saga.write_unresolved(PurchaseStep::DebitBuyer);
        saga.step_failed(PurchaseStep::DebitBuyer);

        assert!(saga.compensation_plan().is_empty());
        saga.finish_compensation();

        assert_eq!(saga.state(), PurchaseState::Inconsistent);
        assert_eq!(saga.failed_compensations(), &[PurchaseStep::DebitBuyer]);
    }

    #[test]
    fn ledger_entry_uses_reserved_id() {
        let (coupon, buyer) = fixtures();
        let saga = PurchaseSaga::new(&coupon, &buyer);
        let entry = saga.ledger_entry();

        assert_eq!(entry.id, saga.ledger_entry_id());
        assert_eq!(entry.amount, coupon.price);
        assert_eq!(entry.seller_id, coupon.seller_id);
        assert_eq!(entry.buyer_id, buyer.id);
    }
}
